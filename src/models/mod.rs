use serde::{Deserialize, Serialize};

/// Marker carried by every locally generated id until the backend assigns a real one.
pub(crate) const TEMP_ID_PREFIX: &str = "temp-";

pub(crate) fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Manual {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subsections: Vec<Subsection>,

    /// Original temporary id; survives reconciliation so draft keys stay stable.
    #[serde(default, rename = "tempId", skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Subsection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Persisted node edited locally since the last save.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dirty: bool,

    #[serde(default, rename = "tempId", skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum BlockKind {
    #[default]
    Text,
    Video,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Block {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: BlockKind,

    /// Raw text for text blocks, resolved media URL for video blocks.
    #[serde(default)]
    pub content: String,

    #[serde(default, rename = "videoId", skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,

    /// Persisted node edited locally since the last save.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dirty: bool,

    #[serde(default, rename = "tempId", skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

/// Block payload as produced by the block form, before it joins the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NewBlock {
    pub kind: BlockKind,
    pub content: String,
    pub video_id: Option<String>,
}

impl NewBlock {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Text,
            content: content.into(),
            video_id: None,
        }
    }

    pub fn video(video_id: impl Into<String>, resolved_url: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Video,
            content: resolved_url.into(),
            video_id: Some(video_id.into()),
        }
    }
}

/// Shared identity behaviour of every tree level.
pub(crate) trait TreeNode {
    fn id(&self) -> &str;
    fn temp_id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);

    fn is_persisted(&self) -> bool {
        !is_temp_id(self.id())
    }

    /// A node is addressable by its current id or by the temporary id it was born with.
    fn matches(&self, key: &str) -> bool {
        self.id() == key || self.temp_id() == Some(key)
    }

    /// Key that never changes across reconciliation.
    fn local_key(&self) -> &str {
        self.temp_id().unwrap_or_else(|| self.id())
    }
}

macro_rules! impl_tree_node {
    ($($ty:ty),*) => {
        $(
            impl TreeNode for $ty {
                fn id(&self) -> &str {
                    &self.id
                }

                fn temp_id(&self) -> Option<&str> {
                    self.temp_id.as_deref()
                }

                fn set_id(&mut self, id: String) {
                    self.id = id;
                }
            }
        )*
    };
}

impl_tree_node!(Section, Subsection, Block);

impl Section {
    pub fn new_draft(temp_id: String, title: &str) -> Self {
        Self {
            id: temp_id.clone(),
            title: title.trim().to_string(),
            subsections: vec![],
            temp_id: Some(temp_id),
        }
    }
}

impl Subsection {
    pub fn new_draft(temp_id: String, title: &str) -> Self {
        Self {
            id: temp_id.clone(),
            title: title.trim().to_string(),
            blocks: vec![],
            dirty: false,
            temp_id: Some(temp_id),
        }
    }
}

impl Block {
    pub fn new_draft(temp_id: String, block: NewBlock) -> Self {
        Self {
            id: temp_id.clone(),
            kind: block.kind,
            content: block.content,
            video_id: block.video_id,
            dirty: false,
            temp_id: Some(temp_id),
        }
    }
}
