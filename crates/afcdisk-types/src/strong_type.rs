/// Wraps a primitive in a newtype so handles and counters cannot be mixed up.
///
/// The generated type is `Copy`, ordered, hashable, serializes transparently
/// and derefs to the inner value.
#[macro_export]
macro_rules! strong_type {
    ($name:ident, $inner:ty) => {
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl ::std::ops::Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(val: $inner) -> Self {
                Self(val)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(val: $name) -> Self {
                val.0
            }
        }
    };
}

/// String flavour of [`strong_type!`] for identifiers such as volume names.
///
/// The type is `Clone` (not `Copy`), derefs to `str`, and converts from both
/// `&str` and `String`.
#[macro_export]
macro_rules! strong_string {
    ($name:ident) => {
        #[derive(
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = str;

            #[inline]
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(val: &str) -> Self {
                Self(val.to_string())
            }
        }

        impl From<String> for $name {
            fn from(val: String) -> Self {
                Self(val)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    strong_type!(TestHandle, u64);
    strong_string!(TestName);

    #[test]
    fn test_strong_type_deref_and_from() {
        let h: TestHandle = 42u64.into();
        assert_eq!(*h, 42);
        let raw: u64 = h.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn test_strong_type_formatting() {
        let h = TestHandle(7);
        assert_eq!(format!("{}", h), "7");
        assert_eq!(format!("{:?}", h), "TestHandle(7)");
    }

    #[test]
    fn test_strong_type_hash_and_order() {
        let mut set = HashSet::new();
        set.insert(TestHandle(1));
        set.insert(TestHandle(2));
        set.insert(TestHandle(1));
        assert_eq!(set.len(), 2);
        assert!(TestHandle(1) < TestHandle(2));
    }

    #[test]
    fn test_strong_type_serde_is_transparent() {
        let json = serde_json::to_string(&TestHandle(99)).unwrap();
        assert_eq!(json, "99");
    }

    #[test]
    fn test_strong_string() {
        let name = TestName::from("Test");
        assert_eq!(name.as_str(), "Test");
        assert_eq!(name.len(), 4);
        assert_eq!(format!("{:?}", name), "TestName(\"Test\")");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Test\"");
    }
}
