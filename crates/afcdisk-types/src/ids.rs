strong_type!(FileHandle, u64);
strong_string!(FsId);
strong_string!(VolumeName);
