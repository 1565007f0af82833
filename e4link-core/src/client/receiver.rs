//! Background receive loop: drains the socket, classifies each line,
//! and applies it to shared state.
//!
//! Nothing a line contains can stop the loop. Only a transport failure
//! or a local close ends it.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::client::Shared;
use crate::codec::Frame;
use crate::error::{DecodeError, E4Error};
use crate::error_log::ErrorCategory;
use crate::message::{Ack, AckKind, KNOWN_DEVICE_TYPE, Message};
use crate::network::Connection;
use crate::state::PendingKey;

pub(crate) async fn receive_loop(mut conn: Connection, shared: Arc<Shared>) {
    let activated = shared.phase.lock().activate();
    if let Err(e) = activated {
        tracing::error!("receive loop not started: {e}");
        shared.record(ErrorCategory::Other, e.to_string());
        conn.close();
        return;
    }
    tracing::debug!("receive loop started");
    loop {
        let frame = match conn.recv().await {
            Ok(frame) => frame,
            Err(e) => {
                on_transport_failure(&shared, e);
                break;
            }
        };
        match frame {
            Frame::Line(line) => handle_line(&shared, &line),
            Frame::Oversized(len) => {
                shared.record(ErrorCategory::DataError, DecodeError::OversizedLine(len).to_string())
            }
        }
    }

    conn.close();
    shared.pending.lock().clear();
    shared.update_status(|s| s.connected = false);
    // Last, so a stopped phase implies the status is final.
    shared.phase.lock().stop();
    tracing::debug!("receive loop stopped");
}

fn on_transport_failure(shared: &Shared, error: E4Error) {
    if shared.closed_locally.load(Ordering::SeqCst) {
        return;
    }
    tracing::error!("bridge connection lost: {error}");
    shared.record(ErrorCategory::Other, error.to_string());
}

pub(crate) fn handle_line(shared: &Shared, line: &str) {
    match Message::parse(line) {
        Ok(None) => {}
        Ok(Some(Message::Control(ack))) => apply_ack(shared, ack),
        Ok(Some(Message::Data(record))) => match shared.device() {
            Some(device) => device.lock().apply(&record),
            None => tracing::trace!(line, "data with no device attached"),
        },
        Err(e) => shared.record(ErrorCategory::DataError, format!("{e}: {line}")),
    }
}

fn apply_ack(shared: &Shared, ack: Ack) {
    if ack.is_error {
        // A rejected request will never be confirmed.
        match ack.kind {
            AckKind::Subscribe {
                stream: Some(stream),
                ..
            } => {
                shared.pending.lock().resolve(PendingKey::Subscribe(stream));
            }
            AckKind::Pause(_) => {
                shared.pending.lock().resolve(PendingKey::Pause);
            }
            _ => {}
        }
        shared.record(ErrorCategory::CommandError, ack.raw);
        return;
    }

    match ack.kind {
        AckKind::DeviceList(entries) => {
            let ids: Vec<String> = entries
                .into_iter()
                .filter(|e| e.device_type == KNOWN_DEVICE_TYPE)
                .map(|e| e.id)
                .collect();
            tracing::info!(count = ids.len(), "device list updated");
            *shared.discovered.lock() = ids;
        }
        AckKind::Connect => {
            shared.update_status(|s| s.connected = true);
            shared.arm_window();
        }
        AckKind::Disconnect => shared.update_status(|s| s.connected = false),
        AckKind::Subscribe {
            stream: Some(stream),
            state,
        } => {
            let requested = shared.pending.lock().resolve(PendingKey::Subscribe(stream));
            if let Some(req) = &requested {
                tracing::debug!(%stream, elapsed = ?req.elapsed(), "subscribe acknowledged");
            }
            match state.or(requested.map(|r| r.requested)) {
                Some(on) => shared.update_status(|s| s.set_subscribed(stream, on)),
                None => tracing::warn!(%stream, "subscribe ack with no pending request, ignored"),
            }
        }
        AckKind::Subscribe { stream: None, .. } => {
            shared.record(ErrorCategory::Other, format!("subscribe ack without stream: {}", ack.raw));
        }
        AckKind::Pause(state) => {
            let requested = shared.pending.lock().resolve(PendingKey::Pause);
            match state.or(requested.map(|r| r.requested)) {
                Some(paused) => shared.update_status(|s| s.streaming = !paused),
                None => tracing::warn!("pause ack with no pending request, ignored"),
            }
        }
        AckKind::DeviceLost => {
            shared.record(ErrorCategory::Other, ack.raw);
            shared.update_status(|s| s.connected = false);
        }
        AckKind::Other(keyword) => tracing::debug!(%keyword, "unhandled control message"),
    }
}
