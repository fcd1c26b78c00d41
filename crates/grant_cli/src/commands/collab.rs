//! `grant collab watch`

use super::load_config;
use crate::{CollabAction, Context};
use anyhow::{bail, Result};
use grant_collab::{CollabNotification, CollaborationCoordinator, LocalUser, NotificationKind};
use grant_common::{SystemClock, TokioScheduler, EXIT_TERMINATED};
use grant_store::HttpRemoteStore;
use std::sync::Arc;

const WATCHED: [NotificationKind; 7] = [
    NotificationKind::FieldUpdated,
    NotificationKind::SectionUpdated,
    NotificationKind::FieldLocked,
    NotificationKind::FieldUnlocked,
    NotificationKind::UserJoined,
    NotificationKind::UserLeft,
    NotificationKind::CursorMoved,
];

pub async fn cmd_collab(ctx: &Context, action: CollabAction) -> Result<()> {
    match action {
        CollabAction::Watch {
            org,
            user,
            name,
            email,
        } => watch(ctx, org, user, name, email).await,
    }
}

async fn watch(
    ctx: &Context,
    org: String,
    user: String,
    name: String,
    email: Option<String>,
) -> Result<()> {
    if ctx.offline {
        bail!("collaboration needs the remote store, drop --offline");
    }
    let config = load_config(ctx)?;
    let store = HttpRemoteStore::from_config(&config.remote)?;

    let coordinator = CollaborationCoordinator::new(
        Arc::new(store),
        Arc::new(SystemClock),
        Arc::new(TokioScheduler),
        config.collaboration.clone(),
    );
    for kind in WATCHED {
        coordinator.on(kind, print_notification);
    }

    let mut local = LocalUser::new(user, name);
    if let Some(email) = email {
        local = local.with_email(email);
    }
    coordinator.initialize(&org, local).await?;
    eprintln!("✓ Joined {} (Ctrl-C to leave)", org);

    tokio::signal::ctrl_c().await?;

    coordinator.cleanup().await;
    eprintln!("\n✓ Left {}", org);
    std::process::exit(EXIT_TERMINATED);
}

fn print_notification(notification: &CollabNotification) {
    let kind = notification.kind().as_str();
    match notification {
        CollabNotification::FieldUpdated(update) => {
            let conflict = if update.has_conflict { " (conflict)" } else { "" };
            println!(
                "{:<14} {} = {} by {}{}",
                kind, update.field_id, update.value, update.user_name, conflict
            );
        }
        CollabNotification::SectionUpdated {
            section_id,
            user_name,
            ..
        } => println!("{:<14} {} by {}", kind, section_id, user_name),
        CollabNotification::FieldLocked(lock) => {
            println!("{:<14} {} by {}", kind, lock.field_id, lock.user_name)
        }
        CollabNotification::FieldUnlocked { field_id, user_id } => {
            println!("{:<14} {} by {}", kind, field_id, user_id)
        }
        CollabNotification::UserJoined(user) => {
            println!("{:<14} {} <{}>", kind, user.name, user.id)
        }
        CollabNotification::UserLeft { user_id, user_name } => {
            println!("{:<14} {} <{}>", kind, user_name, user_id)
        }
        CollabNotification::CursorMoved {
            user_id, position, ..
        } => println!("{:<14} {} at ({}, {})", kind, user_id, position.x, position.y),
    }
}
