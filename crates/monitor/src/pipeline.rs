use metrics::counter;
use solana_sdk::{native_token::lamports_to_sol, pubkey::Pubkey};
use sweep_relay_domain::model::{LogCategory, LogEntry, SendDetailRecord};
use sweep_relay_domain::services::telemetry::MONITOR_NOTIFICATIONS_TOTAL;

use crate::forwarder::Forwarder;
use crate::rpc::LogNotification;
use crate::worker::MonitorError;

/// Reads the balance once at startup and reports it. Returns the balance to
/// sweep when it is positive, covering funds that arrived while the process
/// was down.
pub async fn initial_balance(
    forwarder: &Forwarder,
    account: &Pubkey,
) -> Result<Option<u64>, MonitorError> {
    // The primary endpoint answers every read so all balances share one view
    // of the ledger.
    let primary = forwarder.registry().primary();
    let balance = primary.client.balance(account).await?;
    forwarder.store().log(
        LogCategory::Info,
        format!("initial balance: {} SOL", lamports_to_sol(balance)),
    );
    Ok((balance > 0).then_some(balance))
}

/// Handles one account log notification: re-reads the settled balance from
/// the primary endpoint and sweeps it when positive. The balance carried by
/// the notification itself is never trusted.
pub async fn process_notification(
    forwarder: &Forwarder,
    account: &Pubkey,
    notification: LogNotification,
) -> Result<Option<SendDetailRecord>, MonitorError> {
    // 1. Re-read the balance at `processed`; the notification only says that
    //    something touched the account.
    let primary = forwarder.registry().primary();
    let balance = match primary.client.balance(account).await {
        Ok(balance) => balance,
        Err(err) => {
            counter!(MONITOR_NOTIFICATIONS_TOTAL, "result" => "read_error").increment(1);
            return Err(err.into());
        }
    };

    // 2. Outgoing transfers (including our own sweeps) also notify. An empty
    //    account means there is nothing to do and nothing worth logging.
    if balance == 0 {
        counter!(MONITOR_NOTIFICATIONS_TOTAL, "result" => "empty").increment(1);
        return Ok(None);
    }

    // 3. Record the deposit with the triggering signature and slot so the
    //    dashboard can link it to the sweep that follows.
    counter!(MONITOR_NOTIFICATIONS_TOTAL, "result" => "forwarded").increment(1);
    forwarder.store().record_log(
        LogEntry::new(
            LogCategory::Receive,
            format!(
                "new transaction {} - balance: {} SOL",
                notification.signature,
                lamports_to_sol(balance)
            ),
        )
        .with_field("signature", notification.signature.clone())
        .with_field("slot", notification.slot),
    );

    // 4. Sweep. `forward` records its own outcome and never fails.
    Ok(Some(forwarder.forward(balance).await))
}
