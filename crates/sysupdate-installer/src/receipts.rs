use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::{AppLayout, UpdateReceipt};

pub fn write_update_receipt(layout: &AppLayout, receipt: &UpdateReceipt) -> Result<PathBuf> {
    let mut payload = String::new();
    payload.push_str(&format!("txid={}\n", receipt.txid));
    payload.push_str(&format!("package={}\n", receipt.package));
    if let Some(sha256) = &receipt.package_sha256 {
        payload.push_str(&format!("package_sha256={}\n", sha256));
    }
    payload.push_str(&format!("from_version={}\n", receipt.from_version));
    payload.push_str(&format!("to_version={}\n", receipt.to_version));
    payload.push_str(&format!(
        "installed_at_unix={}\n",
        receipt.installed_at_unix
    ));

    let path = layout.receipt_path(receipt.installed_at_unix, &receipt.to_version);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, payload.as_bytes())
        .with_context(|| format!("failed to write update receipt: {}", path.display()))?;
    Ok(path)
}

pub fn read_update_receipts(layout: &AppLayout) -> Result<Vec<UpdateReceipt>> {
    let dir = layout.history_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut receipts = Vec::new();
    for entry in fs::read_dir(&dir)
        .with_context(|| format!("failed to read update history directory: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|v| v.to_str()) != Some("receipt") {
            continue;
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read update receipt: {}", path.display()))?;
        let receipt = parse_receipt(&raw)
            .with_context(|| format!("failed to parse update receipt: {}", path.display()))?;
        receipts.push(receipt);
    }

    receipts.sort_by(|a, b| {
        a.installed_at_unix
            .cmp(&b.installed_at_unix)
            .then_with(|| a.txid.cmp(&b.txid))
    });
    Ok(receipts)
}

pub(crate) fn parse_receipt(raw: &str) -> Result<UpdateReceipt> {
    let mut txid = None;
    let mut package = None;
    let mut package_sha256 = None;
    let mut from_version = None;
    let mut to_version = None;
    let mut installed_at_unix = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k {
            "txid" => txid = Some(v.to_string()),
            "package" => package = Some(v.to_string()),
            "package_sha256" => package_sha256 = Some(v.to_string()),
            "from_version" => from_version = Some(v.to_string()),
            "to_version" => to_version = Some(v.to_string()),
            "installed_at_unix" => {
                installed_at_unix = Some(v.parse().context("installed_at_unix must be u64")?)
            }
            _ => {}
        }
    }

    Ok(UpdateReceipt {
        txid: txid.context("missing txid")?,
        package: package.unwrap_or_default(),
        package_sha256,
        from_version: from_version.context("missing from_version")?,
        to_version: to_version.context("missing to_version")?,
        installed_at_unix: installed_at_unix.context("missing installed_at_unix")?,
    })
}
