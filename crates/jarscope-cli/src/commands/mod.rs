//! Command dispatch and handler modules.

mod collect;
mod decompile;
mod diff;
mod ingest;
mod query;
mod register;
mod sweep;
mod versions;

use jarscope_ops::ServiceSelector;

use crate::cli::{Cli, Command, SelectorArgs};

/// Route a parsed CLI invocation to the appropriate stage handler. Returns
/// the process exit code.
pub async fn dispatch(cli: Cli) -> miette::Result<i32> {
    let db = cli
        .db
        .clone()
        .unwrap_or_else(jarscope_core::config::default_db_path);

    match cli.command {
        Command::RegisterServices { config, create_sample } => {
            register::exec(&db, config.as_deref(), create_sample.as_deref())
        }
        Command::CollectJars { selector } => collect::exec_jars(&db, to_selector(&selector)).await,
        Command::CollectClasses { selector } => {
            collect::exec_classes(&db, to_selector(&selector)).await
        }
        Command::DecompileJars { selector, decompile } => {
            decompile::exec_jars(&db, to_selector(&selector), &decompile).await
        }
        Command::DecompileClasses { selector, decompile } => {
            decompile::exec_classes(&db, to_selector(&selector), &decompile).await
        }
        Command::IngestSources {
            selector,
            jar_name,
            class_name,
            dry_run,
        } => ingest::exec(&db, to_selector(&selector), jar_name, class_name, dry_run),
        Command::AssignVersions {
            jars,
            classes,
            jar_name,
            class_name,
        } => versions::exec_assign(&db, jars, classes, jar_name.as_deref(), class_name.as_deref()),
        Command::SweepOrphans { execute } => sweep::exec(&db, execute),
        Command::Diff {
            kind,
            name,
            from,
            to,
            file,
            include_unchanged,
        } => diff::exec(&db, &kind, &name, from, to, file, include_unchanged),
        Command::Versions { kind, name } => query::exec_versions(&db, &kind, &name),
        Command::Search { query: q, kind } => query::exec_search(&db, &q, kind.as_deref()),
        Command::Services => query::exec_services(&db),
    }
}

fn to_selector(args: &SelectorArgs) -> ServiceSelector {
    ServiceSelector {
        service: args.service.clone(),
        environment: args.environment.clone(),
        all_services: args.all_services,
    }
}
