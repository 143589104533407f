//! Best-effort pinning with rotation at the platform pin ceiling.

use pullfeed_core::message::PIN_LIMIT;
use pullfeed_core::{ChannelError, ChannelSender, MessageHandle, UserId};

/// What happened to a pin attempt. Never an error for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinOutcome {
    Pinned {
        /// Our own older pin removed to make room.
        unpinned: Option<MessageHandle>,
        /// The platform's "pinned a message" notice was deleted.
        notice_removed: bool,
    },
    /// Channel is at the ceiling and none of the pins are ours.
    SkippedFull,
    Failed(ChannelError),
}

/// Pin `target`. At [`PIN_LIMIT`] pins, unpin our oldest pin first, or skip if
/// we own none. Afterwards remove the pin notice if it is the latest message.
pub async fn pin_with_rotation(
    sender: &dyn ChannelSender,
    bot: UserId,
    target: MessageHandle,
) -> PinOutcome {
    match try_pin(sender, bot, target).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("📌 Pin in channel {} failed: {e}", target.channel);
            PinOutcome::Failed(e)
        }
    }
}

async fn try_pin(
    sender: &dyn ChannelSender,
    bot: UserId,
    target: MessageHandle,
) -> Result<PinOutcome, ChannelError> {
    let pins = sender.list_pins(target.channel).await?;

    let mut unpinned = None;
    if pins.len() >= PIN_LIMIT {
        // Listed newest first; rotate out the oldest of ours.
        let Some(oldest_own) = pins.iter().rev().find(|p| p.author == bot) else {
            tracing::info!(
                "📌 Channel {} has {} pins, none ours, skipping pin",
                target.channel,
                pins.len()
            );
            return Ok(PinOutcome::SkippedFull);
        };
        sender.unpin_message(oldest_own.handle).await?;
        unpinned = Some(oldest_own.handle);
    }

    sender.pin_message(target).await?;

    let mut notice_removed = false;
    if let Some(latest) = sender.latest_message(target.channel).await?
        && latest.is_pin_notice
    {
        sender.delete_message(latest.handle).await?;
        notice_removed = true;
    }

    Ok(PinOutcome::Pinned {
        unpinned,
        notice_removed,
    })
}
