use std::path::Path;

use jarscope_ops::ops_decompile::{self, DecompileOptions, Decompiler};
use jarscope_ops::ServiceSelector;

use crate::cli::DecompileArgs;

pub async fn exec_jars(
    db: &Path,
    selector: ServiceSelector,
    args: &DecompileArgs,
) -> miette::Result<i32> {
    let summary =
        ops_decompile::decompile_jars(db, &selector, Decompiler::from_command(&args.decompiler)?, options(args))
            .await?;
    Ok(summary.exit_code())
}

pub async fn exec_classes(
    db: &Path,
    selector: ServiceSelector,
    args: &DecompileArgs,
) -> miette::Result<i32> {
    let summary = ops_decompile::decompile_classes(
        db,
        &selector,
        Decompiler::from_command(&args.decompiler)?,
        options(args),
    )
    .await?;
    Ok(summary.exit_code())
}

fn options(args: &DecompileArgs) -> DecompileOptions {
    DecompileOptions {
        force: args.force,
        include_third_party: args.third_party,
        jobs: args.jobs,
    }
}
