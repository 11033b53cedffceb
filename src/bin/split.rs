//! Splits `dataset/<class>/*` into `dataset/{train,val,test}/<class>/*`.
//!
//! Run with:
//!   cargo run --release --bin split

use anyhow::Context;
use tracing::info;

use ferrite_leaf::{logging, split_dataset, SplitConfig};

fn main() -> anyhow::Result<()> {
    logging::init();

    let config = SplitConfig::default();
    info!(
        source = %config.dataset_dir.display(),
        test_size = config.test_size,
        val_size = config.val_size,
        seed = config.seed,
        "splitting dataset"
    );
    let report = split_dataset(&config)
        .with_context(|| format!("failed to split {}", config.dataset_dir.display()))?;

    let (train, val, test) = report.classes.iter().fold((0, 0, 0), |(a, b, c), class| {
        (a + class.train.len(), b + class.val.len(), c + class.test.len())
    });
    info!(classes = report.classes.len(), train, val, test, "dataset split complete");
    Ok(())
}
