use super::DraftStore;
use crate::editor::tree::RemovedNode;
use crate::models::{Section, Subsection, TreeNode};
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};

pub(crate) fn manual_draft_key(manual_id: &str) -> String {
    format!("clinic_manual_draft::{manual_id}")
}

pub(crate) fn subsection_draft_key(manual_id: &str, section_key: &str) -> String {
    format!("clinic_manual_subsections::{manual_id}::{section_key}")
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct DraftSnapshot {
    pub sections: Vec<Section>,
    /// Server deletions not yet sent; restored with the tree so a reload keeps them.
    #[serde(default, rename = "pendingDeletes")]
    pub pending_deletes: Vec<RemovedNode>,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SubsectionDraft {
    pub subsections: Vec<Subsection>,
    pub timestamp: i64,
}

/// Tree to open in the builder after merging recovered drafts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RestoredTree {
    pub sections: Vec<Section>,
    pub pending_deletes: Vec<RemovedNode>,
    /// Anything came from drafts rather than the server.
    pub recovered: bool,
}

/// Merge recovered drafts over what the server returned.
///
/// A stored manual snapshot replaces the server tree wholesale, even when it is
/// empty because everything was deleted. A per-section subsection draft then wins
/// for its section when it is newer than the snapshot.
pub(crate) fn restore_tree<S: KeyValueStore>(
    drafts: &DraftStore<S>,
    manual_id: &str,
    server_sections: Vec<Section>,
) -> RestoredTree {
    if manual_id.trim().is_empty() {
        return RestoredTree {
            sections: server_sections,
            ..Default::default()
        };
    }

    let snapshot: Option<DraftSnapshot> = drafts.read(&manual_draft_key(manual_id), None);

    let (mut restored, snapshot_ts) = match snapshot {
        Some(s) => (
            RestoredTree {
                sections: s.sections,
                pending_deletes: s.pending_deletes,
                recovered: true,
            },
            s.timestamp,
        ),
        None => (
            RestoredTree {
                sections: server_sections,
                ..Default::default()
            },
            0,
        ),
    };

    for section in restored.sections.iter_mut() {
        let key = subsection_draft_key(manual_id, section.local_key());
        let Some(d) = drafts.read::<Option<SubsectionDraft>>(&key, None) else {
            continue;
        };
        if d.timestamp > snapshot_ts {
            section.subsections = d.subsections;
            restored.recovered = true;
        }
    }

    restored
}

/// Store a subsection draft unless the slot already holds a newer one.
pub(crate) fn store_subsection_draft<S: KeyValueStore>(
    drafts: &DraftStore<S>,
    key: &str,
    draft: SubsectionDraft,
) {
    drafts.write_with(key, None::<SubsectionDraft>, |prev| match prev {
        Some(p) if p.timestamp > draft.timestamp => Some(p),
        _ => Some(draft),
    });
}

/// Drop every draft entry belonging to the manual once the server holds the data.
pub(crate) fn purge_manual_drafts<S: KeyValueStore>(
    drafts: &DraftStore<S>,
    manual_id: &str,
    sections: &[Section],
) {
    drafts.remove(&manual_draft_key(manual_id));
    for section in sections {
        drafts.remove(&subsection_draft_key(manual_id, section.local_key()));
        if section.local_key() != section.id() {
            drafts.remove(&subsection_draft_key(manual_id, section.id()));
        }
    }
}
