use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use slotsync::config::ClientConfig;
use slotsync::models::{Role, UserIdentity};
use slotsync::services::api::http::HttpBookingApi;
use slotsync::services::api::BookingApi;
use slotsync::services::realtime::ws::WsChannel;
use slotsync::services::session::{self, SessionNotice};
use slotsync::state::ClientState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ClientConfig::from_env();
    anyhow::ensure!(!config.user_id.is_empty(), "USER_ID must be set");

    let api = HttpBookingApi::new(&config.api_base_url)?;
    let channel = WsChannel::connect(&config, &config.user_id)?;
    tracing::info!(
        api = %config.api_base_url,
        ws = %channel.url(),
        role = config.role.as_str(),
        "starting slot sync client"
    );

    if config.role == Role::Student {
        match api.list_teachers().await {
            Ok(teachers) => {
                for teacher in &teachers {
                    tracing::info!(
                        teacher_id = %teacher.user_id,
                        name = teacher.display_name(),
                        subject = teacher.subject.as_deref().unwrap_or("-"),
                        "teacher"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to list teachers"),
        }
    }

    let state = Arc::new(ClientState {
        user: UserIdentity::new(config.user_id.clone(), config.role),
        config,
        api: Arc::new(api),
        channel: Arc::new(channel),
    });

    let handle = session::spawn(state);
    let mut notices = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notice = notices.recv() => match notice {
                Ok(SessionNotice::SlotsRefreshed) => {
                    if let Ok(snapshot) = handle.snapshot().await {
                        tracing::info!(
                            teacher_id = snapshot.teacher_id.as_deref().unwrap_or("-"),
                            open = snapshot.all.len(),
                            booked = snapshot.booked.len(),
                            "slots refreshed"
                        );
                    }
                }
                Ok(notice) => tracing::info!(?notice, "session notice"),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "notices dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
