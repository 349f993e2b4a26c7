use std::path::Path;

use jarscope_ops::ops_register;
use jarscope_util::errors::JarscopeError;

pub fn exec(
    db: &Path,
    config: Option<&Path>,
    create_sample: Option<&Path>,
) -> miette::Result<i32> {
    match (config, create_sample) {
        (_, Some(path)) => {
            ops_register::create_sample(path)?;
            Ok(0)
        }
        (Some(path), None) => {
            ops_register::register(db, path)?;
            Ok(0)
        }
        (None, None) => Err(JarscopeError::Config {
            message: "pass --config FILE or --create-sample FILE".to_string(),
        }
        .into()),
    }
}
