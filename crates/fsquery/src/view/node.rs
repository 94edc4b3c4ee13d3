//! Directory and file node types.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::strings::StringRef;

use super::arena::{DirId, FileId, OptionDirId, OptionFileId};

/// File type derived from a stat snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    #[default]
    Unknown,
}

impl FileKind {
    /// Parses the single-character type code used by query terms.
    pub fn from_type_char(code: char) -> Option<Self> {
        match code {
            'f' => Some(Self::File),
            'd' => Some(Self::Dir),
            'l' => Some(Self::Symlink),
            'b' => Some(Self::BlockDevice),
            'c' => Some(Self::CharDevice),
            'p' => Some(Self::Fifo),
            's' => Some(Self::Socket),
            _ => None,
        }
    }

    pub fn type_char(self) -> char {
        match self {
            Self::File => 'f',
            Self::Dir => 'd',
            Self::Symlink => 'l',
            Self::BlockDevice => 'b',
            Self::CharDevice => 'c',
            Self::Fifo => 'p',
            Self::Socket => 's',
            Self::Unknown => '?',
        }
    }
}

impl From<std::fs::FileType> for FileKind {
    fn from(file_type: std::fs::FileType) -> Self {
        if file_type.is_file() {
            return Self::File;
        }
        if file_type.is_dir() {
            return Self::Dir;
        }
        if file_type.is_symlink() {
            return Self::Symlink;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_block_device() {
                return Self::BlockDevice;
            }
            if file_type.is_char_device() {
                return Self::CharDevice;
            }
            if file_type.is_fifo() {
                return Self::Fifo;
            }
            if file_type.is_socket() {
                return Self::Socket;
            }
        }
        Self::Unknown
    }
}

/// Observed stat snapshot for a file entry.
///
/// While the entry exists this reflects the most recent successful stat;
/// after deletion it holds the last-known values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub ctime: i64,
    pub ino: u64,
    pub dev: u64,
    pub kind: FileKind,
}

impl FileStat {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self {
                size: meta.len(),
                mode: meta.mode(),
                mtime: meta.mtime(),
                ctime: meta.ctime(),
                ino: meta.ino(),
                dev: meta.dev(),
                kind: FileKind::from(meta.file_type()),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                size: meta.len(),
                mode: 0,
                mtime: meta
                    .modified()
                    .ok()
                    .map(|t| epoch_secs(t))
                    .unwrap_or_default(),
                ctime: 0,
                ino: 0,
                dev: 0,
                kind: FileKind::from(meta.file_type()),
            }
        }
    }
}

/// A point in logical and wall time: the tick stamped by the crawler and
/// the wall-clock seconds observed alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockStamp {
    pub ticks: u32,
    pub timestamp: i64,
}

/// Converts a `SystemTime` to epoch seconds.
pub fn epoch_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

/// One directory known to the view.
///
/// Directories are retained with `exists = false` after deletion so queries
/// can still report their contents until aged out.
#[derive(Debug)]
pub struct DirNode {
    pub(crate) parent: OptionDirId,
    pub name: StringRef,
    pub dirs: HashMap<StringRef, DirId>,
    pub files: HashMap<StringRef, FileId>,
    pub exists: bool,
}

impl DirNode {
    pub(crate) fn new(parent: Option<DirId>, name: StringRef) -> Self {
        Self {
            parent: OptionDirId::from_option(parent),
            name,
            dirs: HashMap::new(),
            files: HashMap::new(),
            exists: true,
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<DirId> {
        self.parent.to_option()
    }
}

/// One filesystem entry (regular, symlink, special) within a directory.
#[derive(Debug)]
pub struct FileNode {
    pub parent: DirId,
    pub name: StringRef,
    pub exists: bool,
    pub stat: FileStat,
    /// Most recent observation.
    pub otime: ClockStamp,
    /// First discovery.
    pub ctime: ClockStamp,
    /// Cached lowercase suffix; files with no `.` are not suffix-indexed.
    pub(crate) suffix: Option<StringRef>,
    pub(crate) recency_prev: OptionFileId,
    pub(crate) recency_next: OptionFileId,
    pub(crate) suffix_prev: OptionFileId,
    pub(crate) suffix_next: OptionFileId,
}

impl FileNode {
    pub(crate) fn new(parent: DirId, name: StringRef, stamp: ClockStamp) -> Self {
        let suffix = name.suffix();
        Self {
            parent,
            name,
            exists: false,
            stat: FileStat::default(),
            otime: stamp,
            ctime: stamp,
            suffix,
            recency_prev: OptionFileId::none(),
            recency_next: OptionFileId::none(),
            suffix_prev: OptionFileId::none(),
            suffix_next: OptionFileId::none(),
        }
    }

    pub fn suffix(&self) -> Option<&StringRef> {
        self.suffix.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_type_chars_roundtrip() {
        for kind in [
            FileKind::File,
            FileKind::Dir,
            FileKind::Symlink,
            FileKind::BlockDevice,
            FileKind::CharDevice,
            FileKind::Fifo,
            FileKind::Socket,
        ] {
            assert_eq!(FileKind::from_type_char(kind.type_char()), Some(kind));
        }
        assert_eq!(FileKind::from_type_char('x'), None);
    }

    #[test]
    fn new_file_node_caches_suffix() {
        let stamp = ClockStamp {
            ticks: 1,
            timestamp: 100,
        };
        let node = FileNode::new(DirIdForTest::id(), StringRef::new("Photo.JPG"), stamp);
        assert_eq!(node.suffix().unwrap(), "jpg");
        assert!(!node.exists);
        assert_eq!(node.otime, stamp);
        assert_eq!(node.ctime, stamp);
    }

    struct DirIdForTest;

    impl DirIdForTest {
        fn id() -> DirId {
            use crate::view::arena::ArenaId;
            DirId::from_raw(0)
        }
    }
}
