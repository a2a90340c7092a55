use std::io::ErrorKind;

use crate::{CheckError, CheckType, Checker, Params, CHECK_FILE_EXISTS};

/// Checks that the file at `path` exists.
pub struct FileExists;

#[async_trait::async_trait]
impl Checker for FileExists {
    fn check_type(&self) -> CheckType {
        CHECK_FILE_EXISTS.into()
    }

    async fn run(&self, params: &Params) -> Result<(), CheckError> {
        match tokio::fs::metadata(&params.path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(CheckError::failed(format!(
                "file does not exist: {}",
                params.path
            ))),
            // Other stat failures (e.g. permissions) are not the file's absence.
            Err(_) => Ok(()),
        }
    }
}
