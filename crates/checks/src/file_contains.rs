use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::{CheckError, CheckType, Checker, Params, CHECK_FILE_CONTAINS};

/// Checks that the file at `path` contains the text in `check`.
///
/// The file is streamed in batches so very big files (e.g. logs) never have
/// to fit in memory. Adjacent batches keep an overlap of the needle's length,
/// so a match spanning a batch boundary is still found.
pub struct FileContains {
    /// Batch size as a multiple of the needle length. Small values are only
    /// useful to exercise the boundary handling in tests.
    batch_mult: usize,
}

const DEFAULT_BATCH_MULT: usize = 2000;

impl Default for FileContains {
    fn default() -> Self {
        FileContains {
            batch_mult: DEFAULT_BATCH_MULT,
        }
    }
}

impl FileContains {
    #[cfg(test)]
    fn with_batch_mult(batch_mult: usize) -> Self {
        FileContains { batch_mult }
    }
}

#[async_trait::async_trait]
impl Checker for FileContains {
    fn check_type(&self) -> CheckType {
        CHECK_FILE_CONTAINS.into()
    }

    async fn run(&self, params: &Params) -> Result<(), CheckError> {
        let mut file = File::open(&params.path)
            .await
            .map_err(|err| CheckError::failed(format!("error opening file: {err}")))?;

        // An empty needle is trivially contained, but the file must still
        // open for the check to pass.
        let needle = params.check.as_bytes();
        if needle.is_empty() {
            return Ok(());
        }

        let mut buf = vec![0u8; needle.len() * self.batch_mult];
        let mut start = 0;

        loop {
            let n = file.read(&mut buf[start..]).await?;
            if n == 0 {
                break;
            }
            let end = start + n;

            if contains(&buf[..end], needle) {
                return Ok(());
            }

            let overlap = needle.len();
            if overlap > end {
                start = end;
                continue;
            }

            buf.copy_within(end - overlap..end, 0);
            start = overlap;
        }

        Err(CheckError::failed("file does not contain the given text"))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    // These cases mostly exercise how batches are glued together: the batch
    // multiplier of 2 makes batch boundaries fall inside the content.
    #[tokio::test]
    async fn batch_boundaries_are_glued() {
        let cases = [
            ("aaaaaa", "aa", true),
            ("abcdefghij", "fg", true),
            ("abcdefghij", "gf", false),
            ("", "de", false),
            ("a", "de", false),
            ("abcde", "de", true),
            ("abcdef", "ef", true),
            ("abcdefg", "fg", true),
            ("aaaaaaaaaaaaaaaaaa", "a", true),
        ];

        let check = FileContains::with_batch_mult(2);

        for (content, needle, found) in cases {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(content.as_bytes()).unwrap();

            let params = Params {
                path: file.path().display().to_string(),
                check: needle.to_string(),
                ..Default::default()
            };

            let result = check.run(&params).await;
            assert_eq!(
                result.is_ok(),
                found,
                "content {content:?}, needle {needle:?}"
            );
        }
    }

    #[tokio::test]
    async fn empty_needle_still_requires_the_file_to_open() {
        let check = FileContains::default();

        let file = NamedTempFile::new().unwrap();
        let params = Params {
            path: file.path().display().to_string(),
            ..Default::default()
        };
        assert!(check.run(&params).await.is_ok());

        let params = Params {
            path: "no/such/file".to_string(),
            ..Default::default()
        };
        let err = check.run(&params).await.unwrap_err();
        assert!(err.to_string().contains("error opening file"));
    }

    #[tokio::test]
    async fn missing_file_reports_open_error() {
        let check = FileContains::default();
        let params = Params {
            path: "no/such/file".to_string(),
            check: "x".to_string(),
            ..Default::default()
        };

        let err = check.run(&params).await.unwrap_err();
        assert!(err.to_string().contains("error opening file"));
    }
}
