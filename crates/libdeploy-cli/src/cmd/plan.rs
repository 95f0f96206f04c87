use super::TargetArgs;
use crate::output::{display_path, print_json, print_table};
use libdeploy_core::config::DeployConfig;

pub fn run(args: &TargetArgs, config: &DeployConfig, json: bool) -> anyhow::Result<()> {
    let (platform, arch) = args.target()?;
    let deployer = args.deployer(platform, arch)?;
    let plan = deployer.plan(&args.request(platform, arch), config)?;

    if json {
        return print_json(&plan);
    }

    if let Some(reason) = plan.skipped {
        println!("skipped ({reason})");
        return Ok(());
    }

    if plan.libraries.is_empty() {
        println!("No runtime libraries to deploy.");
        return Ok(());
    }

    let rows = plan
        .libraries
        .iter()
        .map(|lib| vec![lib.name.clone(), display_path(lib.source.as_deref())])
        .collect();
    print_table(&["LIBRARY", "SOURCE"], rows);
    if plan.used_fallback {
        println!();
        println!("(dependency detection failed; default runtime set)");
    }
    Ok(())
}
