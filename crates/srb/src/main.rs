use std::sync::Arc;

use srb_core::{config::Config, store::RecordStore};
use srb_sheets::SheetsClient;

#[tokio::main]
async fn main() -> Result<(), srb_core::Error> {
    srb_core::logging::init("srb")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn RecordStore> = Arc::new(SheetsClient::new(
        cfg.sheets_access_token.clone(),
        cfg.sheet_id.clone(),
        cfg.sheet_name.clone(),
    ));

    srb_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| srb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
