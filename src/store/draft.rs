use serde::Serialize;

/// The single node under local editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Draft {
    /// A placeholder reply inserted as the first child of `parent_id`.
    Reply {
        post_id: String,
        parent_id: String,
        /// Whether the parent's children were loaded before the
        /// placeholder went in. Dropping the placeholder from a parent
        /// that was never loaded puts `children: None` back.
        parent_was_loaded: bool,
    },
    Edit {
        post_id: String,
    },
}

impl Draft {
    pub fn post_id(&self) -> &str {
        match self {
            Self::Reply { post_id, .. } | Self::Edit { post_id } => post_id,
        }
    }

    pub fn is_reply(&self, id: &str) -> bool {
        matches!(self, Self::Reply { post_id, .. } if post_id == id)
    }

    pub fn is_edit(&self, id: &str) -> bool {
        matches!(self, Self::Edit { post_id } if post_id == id)
    }
}
