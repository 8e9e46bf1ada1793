/// Shared utility functions for the report tools
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Replace `path` with the bytes produced by `write`
///
/// The content is written to a temporary file next to the target and renamed
/// over it once complete, so readers never observe a half-written table and a
/// failed write leaves any previous file untouched.
pub fn replace_file<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Substitute the report year for `{year}` in a configured path
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use teotil_report::utils::expand_year_template;
///
/// assert_eq!(
///     expand_year_template(Path::new("../report_{year}/tables"), 2023),
///     PathBuf::from("../report_2023/tables")
/// );
/// assert_eq!(
///     expand_year_template(Path::new("legacy"), 2023),
///     PathBuf::from("legacy")
/// );
/// ```
pub fn expand_year_template(path: &Path, year: i32) -> PathBuf {
    let raw = path.to_string_lossy();
    if !raw.contains("{year}") {
        return path.to_path_buf();
    }
    PathBuf::from(raw.replace("{year}", &year.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_replace_file_creates_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Glomma_p.csv");

        replace_file(&path, |w| w.write_all(b"\xc3\x85r\n1990\n")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "År\n1990\n");
    }

    #[test]
    fn test_replace_file_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Agder_n.csv");
        fs::write(&path, "old content that is longer\n").unwrap();

        replace_file(&path, |w| w.write_all(b"new\n")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_replace_file_failed_write_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Troms_p.csv");
        fs::write(&path, "previous\n").unwrap();

        let result = replace_file(&path, |w| {
            w.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous\n");
        // Temporary file is cleaned up on drop
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_expand_year_template_repeated() {
        assert_eq!(
            expand_year_template(Path::new("{year}/out_{year}.xlsx"), 2024),
            PathBuf::from("2024/out_2024.xlsx")
        );
    }
}
