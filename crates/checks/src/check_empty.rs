use crate::{CheckError, CheckType, Checker, Params, CHECK_EMPTY};

/// Succeeds when `check` is empty, fails otherwise. Useful for testing.
pub struct CheckEmpty;

#[async_trait::async_trait]
impl Checker for CheckEmpty {
    fn check_type(&self) -> CheckType {
        CHECK_EMPTY.into()
    }

    async fn run(&self, params: &Params) -> Result<(), CheckError> {
        if !params.check.is_empty() {
            return Err(CheckError::failed("Check is not empty"));
        }
        Ok(())
    }
}
