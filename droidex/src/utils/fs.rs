use std::fs::{self, create_dir_all, File};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

pub const DEVICE_PATH_SEP: &'static str = "/";
pub const DEVICE_PATH_SEP_CHAR: char = '/';

pub fn ensure_dir_exists(p: &Path) -> io::Result<()> {
    if p.exists() {
        return Ok(());
    }

    create_dir_all(p)
}

/// Ensure the parent directory of the given file path exists
pub fn ensure_parent_exists(p: &Path) -> io::Result<()> {
    match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Check to see if the given pathlike type has the given extension
pub fn path_has_ext<P: AsRef<Path> + ?Sized>(p: &P, ext: &str) -> bool {
    let path = p.as_ref();
    path.extension().map_or(false, |it| it == ext)
}

/// Calls `to_str` on the path and returns the string, panicking if that fails
pub fn path_must_str(path: &Path) -> &str {
    path.to_str().expect("valid paths")
}

/// Size of the file at `path`, `None` if it doesn't exist or isn't a file
pub fn file_size(path: &Path) -> Option<u64> {
    match fs::metadata(path) {
        Ok(m) if m.is_file() => Some(m.len()),
        _ => None,
    }
}

/// Turn a device or archive path into a relative local path.
///
/// Leading separators and `.` components are dropped. Returns `None` if the
/// path would escape its destination via `..` or ends up empty.
pub fn sanitize_relative(path: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    for comp in Path::new(path.trim_start_matches(DEVICE_PATH_SEP_CHAR)).components() {
        match comp {
            Component::Normal(c) => rel.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if rel.as_os_str().is_empty() {
        None
    } else {
        Some(rel)
    }
}

pub fn open_file(path: &Path) -> crate::Result<File> {
    match File::open(path) {
        Ok(v) => Ok(v),
        Err(e) => match e.kind() {
            ErrorKind::NotFound => Err(crate::Error::MissingFile(path_must_str(path).into())),
            _ => Err(e.into()),
        },
    }
}

pub fn read_file(path: &Path) -> crate::Result<String> {
    match fs::read_to_string(path) {
        Ok(v) => Ok(v),
        Err(e) => match e.kind() {
            ErrorKind::NotFound => Err(crate::Error::MissingFile(path_must_str(path).into())),
            _ => Err(e.into()),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_path_has_ext() {
        let path = PathBuf::from("path").join("to").join("mmssms.db");
        assert!(path_has_ext(&path, "db"));
        let path = "/path/to/History";
        assert!(!path_has_ext(path, "db"));
    }

    #[rstest]
    #[case("/sdcard/DCIM/a.jpg", Some("sdcard/DCIM/a.jpg"))]
    #[case("apps/com.android.chrome/f/History", Some("apps/com.android.chrome/f/History"))]
    #[case("./apps/./x.db", Some("apps/x.db"))]
    #[case("apps/../../etc/passwd", None)]
    #[case("/", None)]
    #[case("", None)]
    fn test_sanitize_relative(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(sanitize_relative(input), expected.map(PathBuf::from));
    }
}
