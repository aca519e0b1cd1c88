pub use super::conversations::Entity as Conversations;
pub use super::messages::Entity as Messages;
pub use super::participants::Entity as Participants;
pub use super::reactions::Entity as Reactions;
