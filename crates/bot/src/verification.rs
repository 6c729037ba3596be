//! Interactive SAS (emoji) verification so other devices can trust the bot.

use futures_util::StreamExt as _;
use matrix_sdk::{
    Client,
    encryption::verification::{
        SasState, SasVerification, Verification, VerificationRequest, VerificationRequestState,
    },
    ruma::events::{
        key::verification::{
            request::ToDeviceKeyVerificationRequestEvent, start::ToDeviceKeyVerificationStartEvent,
        },
        room::message::{MessageType, OriginalSyncRoomMessageEvent},
    },
};
use tracing::{debug, info, warn};

/// Accepts incoming verification requests. With `auto_confirm` the emoji
/// comparison is confirmed without a human looking at it.
pub fn register_handlers(client: &Client, auto_confirm: bool) {
    client.add_event_handler(
        move |ev: ToDeviceKeyVerificationRequestEvent, client: Client| async move {
            info!(user = %ev.sender, flow = %ev.content.transaction_id, "Received verification request");
            match client
                .encryption()
                .get_verification_request(&ev.sender, &ev.content.transaction_id)
                .await
            {
                Some(req) => {
                    tokio::spawn(follow_request(req, auto_confirm));
                }
                None => {
                    warn!(user = %ev.sender, flow = %ev.content.transaction_id, "No verification request found");
                }
            }
        },
    );

    client.add_event_handler(
        move |ev: OriginalSyncRoomMessageEvent, client: Client| async move {
            let MessageType::VerificationRequest(_) = &ev.content.msgtype else {
                return;
            };
            info!(user = %ev.sender, event = %ev.event_id, "Received in-room verification request");
            if let Some(req) = client
                .encryption()
                .get_verification_request(&ev.sender, &ev.event_id)
                .await
            {
                tokio::spawn(follow_request(req, auto_confirm));
            }
        },
    );

    client.add_event_handler(
        move |ev: ToDeviceKeyVerificationStartEvent, client: Client| async move {
            info!(user = %ev.sender, flow = %ev.content.transaction_id, "Received verification start");
            if let Some(Verification::SasV1(sas)) = client
                .encryption()
                .get_verification(&ev.sender, ev.content.transaction_id.as_str())
                .await
            {
                tokio::spawn(follow_sas(sas, auto_confirm));
            }
        },
    );
}

async fn follow_request(request: VerificationRequest, auto_confirm: bool) {
    info!(user = %request.other_user_id(), "Accepting verification request");
    if let Err(e) = request.accept().await {
        warn!(error = %e, "Failed to accept verification request");
        return;
    }
    let mut changes = request.changes();
    while let Some(state) = changes.next().await {
        match state {
            VerificationRequestState::Transitioned { verification } => {
                if let Some(sas) = verification.sas() {
                    tokio::spawn(follow_sas(sas, auto_confirm));
                }
                break;
            }
            VerificationRequestState::Cancelled(info) => {
                warn!(reason = %info.reason(), "Verification request cancelled");
                break;
            }
            VerificationRequestState::Done => break,
            VerificationRequestState::Created { .. }
            | VerificationRequestState::Requested { .. }
            | VerificationRequestState::Ready { .. } => {}
        }
    }
}

async fn follow_sas(sas: SasVerification, auto_confirm: bool) {
    info!(user = %sas.other_device().user_id(), device = %sas.other_device().device_id(), "Starting SAS verification");
    if let Err(e) = sas.accept().await {
        warn!(error = %e, "Failed to accept SAS");
        return;
    }

    let mut changes = sas.changes();
    while let Some(state) = changes.next().await {
        match state {
            SasState::KeysExchanged {
                emojis: Some(emojis),
                ..
            } => {
                let symbols = emojis
                    .emojis
                    .iter()
                    .map(|em| em.symbol)
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!(emojis = %symbols, "SAS emojis");
                if auto_confirm && let Err(e) = sas.confirm().await {
                    warn!(error = %e, "Failed to confirm SAS");
                }
            }
            SasState::Done { .. } => {
                info!("Verification completed");
                break;
            }
            SasState::Cancelled(info) => {
                warn!(reason = %info.reason(), "SAS verification cancelled");
                break;
            }
            SasState::Created { .. }
            | SasState::Started { .. }
            | SasState::Accepted { .. }
            | SasState::KeysExchanged { .. }
            | SasState::Confirmed => {}
        }
    }
}
