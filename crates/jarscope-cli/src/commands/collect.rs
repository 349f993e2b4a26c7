use std::path::Path;

use jarscope_ops::{ops_collect, ServiceSelector};

pub async fn exec_jars(db: &Path, selector: ServiceSelector) -> miette::Result<i32> {
    let summary = ops_collect::collect_jars(db, &selector).await?;
    Ok(summary.exit_code())
}

pub async fn exec_classes(db: &Path, selector: ServiceSelector) -> miette::Result<i32> {
    let summary = ops_collect::collect_classes(db, &selector).await?;
    Ok(summary.exit_code())
}
