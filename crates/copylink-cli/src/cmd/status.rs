use crate::output::{print_fields, print_json};
use crate::settings::Globals;

pub fn run(globals: &Globals, account_id: &str) -> anyhow::Result<()> {
    let config = globals.valid_config()?;
    let providers = super::http_providers(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt
        .block_on(providers.provisioning.find_account(account_id))?
        .ok_or_else(|| anyhow::anyhow!("account not found: {account_id}"))?;

    if globals.json {
        return print_json(&snapshot);
    }
    print_fields(&[
        ("account", snapshot.id.clone()),
        ("state", snapshot.lifecycle_state.to_string()),
        ("connection", snapshot.connection_status.to_string()),
        (
            "error",
            snapshot.error_code.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    Ok(())
}
