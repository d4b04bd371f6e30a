use serde::{Deserialize, Serialize};

const AVATAR_FALLBACK_FEMALE: &str = "/avatar-fallback-female.jpeg";
const AVATAR_FALLBACK_MALE: &str = "/avatar-fallback-male.jpg";
const AVATAR_FALLBACK_OTHER: &str = "/avatar-fallback-other.jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Denormalized copy of a post's author, carried on every node.
///
/// The two relationship lists are only as complete as the viewer needs them
/// to be: they answer "does the viewer follow this author" and "has the
/// viewer asked to" without another round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub username: String,
    pub avatar: Option<String>,
    pub gender: Option<Gender>,
    /// Ids of users with an accepted follow of this author.
    pub followings: Vec<String>,
    /// Ids of users with a pending request to follow this author.
    pub follow_requests_received: Vec<String>,
}

/// What a follow button shows for a given viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowState {
    Following,
    Requested,
    NotFollowing,
}

impl AuthorSnapshot {
    pub fn follow_state(&self, viewer_id: &str) -> FollowState {
        if self.followings.iter().any(|id| id == viewer_id) {
            FollowState::Following
        } else if self.follow_requests_received.iter().any(|id| id == viewer_id) {
            FollowState::Requested
        } else {
            FollowState::NotFollowing
        }
    }

    /// Advances the viewer's relationship one step: unfollow, cancel the
    /// pending request, or send a new one.
    pub fn toggle_follow(&mut self, viewer_id: &str) {
        match self.follow_state(viewer_id) {
            FollowState::Following => self.followings.retain(|id| id != viewer_id),
            FollowState::Requested => self.follow_requests_received.retain(|id| id != viewer_id),
            FollowState::NotFollowing => {
                self.follow_requests_received.push(viewer_id.to_string())
            }
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.name, &self.surname) {
            (Some(name), Some(surname)) => format!("{} {}", name, surname),
            (Some(name), None) => name.clone(),
            _ => self.username.clone(),
        }
    }

    /// Avatar url, falling back to a stock image picked by gender.
    pub fn avatar_src(&self) -> &str {
        if let Some(avatar) = self.avatar.as_deref() {
            return avatar;
        }
        match self.gender {
            Some(Gender::Female) => AVATAR_FALLBACK_FEMALE,
            Some(Gender::Male) => AVATAR_FALLBACK_MALE,
            _ => AVATAR_FALLBACK_OTHER,
        }
    }
}
