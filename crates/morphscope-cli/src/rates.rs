//! `morphscope rates`: reduce score files to MMPMR, FNMR and RMMR.

use std::path::Path;

use anyhow::{bail, Context, Result};
use morphscope_core::rates;

pub fn run(mated: &Path, non_mated: &Path, threshold: f64, json: bool) -> Result<()> {
    if !threshold.is_finite() {
        bail!("threshold must be a finite number, got {threshold}");
    }

    let result = rates::compute(mated, non_mated, threshold).with_context(|| {
        format!(
            "failed to compute match rates from {} and {}",
            mated.display(),
            non_mated.display()
        )
    })?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{result}");
    }
    Ok(())
}
