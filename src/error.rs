use std::result;

use serenity::model::id::MessageId;
use serenity::prelude::SerenityError;
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
pub enum Error {
    #[error("{0}")]
    SerenityError(String),
    #[error("{0}")]
    Giveaway(String),
    #[error("Unable to fetch the giveaway message {0}.")]
    MessageNotFound(MessageId),
    #[error("Can't fetch entrants for the giveaway {message_id}: {reason}")]
    EntrantFetch { message_id: MessageId, reason: String },
    #[error("The bonus entry rule '{rule}' failed for the giveaway {message_id}: {reason}")]
    BonusRule {
        message_id: MessageId,
        rule: String,
        reason: String,
    },
    #[error("{0}")]
    Rule(String),
    #[error("{0}")]
    Storage(String),
}

impl From<SerenityError> for Error {
    fn from(err: SerenityError) -> Error {
        let description = err.to_string();
        Error::SerenityError(description)
    }
}
