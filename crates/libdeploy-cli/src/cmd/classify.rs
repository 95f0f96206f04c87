use crate::output::{print_json, print_table};
use libdeploy_core::filter::DependencyFilter;
use libdeploy_core::types::{Classification, Platform};
use serde::Serialize;

#[derive(Serialize)]
struct ClassifiedName<'a> {
    name: &'a str,
    classification: Classification,
    deployable: bool,
}

pub fn run(names: &[String], platform: Option<Platform>, json: bool) -> anyhow::Result<()> {
    let platform = match platform {
        Some(p) => p,
        None => Platform::current()
            .ok_or_else(|| anyhow::anyhow!("unsupported host platform; pass --platform"))?,
    };
    let filter = DependencyFilter::for_platform(platform);

    let classified: Vec<ClassifiedName> = names
        .iter()
        .map(|name| {
            let classification = filter.classify(name);
            ClassifiedName {
                name,
                classification,
                deployable: classification.is_deployable(),
            }
        })
        .collect();

    if json {
        return print_json(&classified);
    }

    let rows = classified
        .iter()
        .map(|c| vec![c.name.to_string(), c.classification.to_string()])
        .collect();
    print_table(&["NAME", "CLASSIFICATION"], rows);
    Ok(())
}
