use std::path::Path;

use jarscope_ops::ops_sweep;

pub fn exec(db: &Path, execute: bool) -> miette::Result<i32> {
    ops_sweep::sweep_orphans(db, execute)?;
    Ok(0)
}
