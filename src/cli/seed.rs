use anyhow::{Result, bail};

use super::SeedCommandArgs;
use crate::core::config::AppConfig;
use crate::core::terminal::{GuideSection, print_info, print_success};
use crate::core::warehouse::Warehouse;

pub(super) async fn run(config: AppConfig, args: SeedCommandArgs) -> Result<()> {
    let Some(path) = config.db_path.clone() else {
        bail!("seed needs a target: pass --db PATH or set CUBEWISE_DB");
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let rows = args.rows.unwrap_or(config.dataset_rows);
    let seed = args.seed.unwrap_or(config.dataset_seed);
    let warehouse = Warehouse::open(&path)?;
    let existing = warehouse.fact_count().await?;
    if existing > 0 {
        print_info(&format!("Replacing {} existing sales", existing));
    }
    let written = warehouse.seed(rows, seed).await?;

    print_success(&format!("Seeded {} sales into {}", written, path.display()));
    let overview = warehouse.overview().await?;
    let mut section = GuideSection::new("Dataset");
    for (label, key) in [
        ("Orders", "total_orders"),
        ("Revenue", "total_revenue"),
        ("Countries", "countries"),
        ("Categories", "categories"),
    ] {
        if let Some(value) = overview.summary.get(key) {
            section = section.status(label, &value.to_string());
        }
    }
    section.status("Seed", &seed.to_string()).print();
    println!();
    Ok(())
}
