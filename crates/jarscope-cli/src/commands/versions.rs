use std::path::Path;

use jarscope_ops::ops_versions;

pub fn exec_assign(
    db: &Path,
    jars: bool,
    classes: bool,
    jar_name: Option<&str>,
    class_name: Option<&str>,
) -> miette::Result<i32> {
    // Neither flag means both kinds.
    let (include_jars, include_classes) = if !jars && !classes {
        (true, true)
    } else {
        (jars, classes)
    };
    ops_versions::assign_versions(db, include_jars, include_classes, jar_name, class_name)?;
    Ok(0)
}
