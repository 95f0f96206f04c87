use super::TargetArgs;
use crate::output::{print_json, print_table, report_rows};
use libdeploy_core::config::DeployConfig;
use libdeploy_core::deploy::LinkStrategy;

pub fn run(args: &TargetArgs, copy_only: bool, config: &DeployConfig, json: bool) -> anyhow::Result<()> {
    let (platform, arch) = args.target()?;
    let strategy = if copy_only {
        LinkStrategy::CopyOnly
    } else {
        LinkStrategy::HardLinkThenCopy
    };
    let deployer = args.deployer(platform, arch)?.with_strategy(strategy);
    let summary = deployer.deploy_all(&args.request(platform, arch), config)?;

    if json {
        return print_json(&summary);
    }

    if !summary.libraries.is_empty() {
        print_table(&["LIBRARY", "OUTCOME", "SOURCE"], report_rows(&summary.libraries));
        println!();
    }
    println!("{summary}");
    Ok(())
}
