//! Pure edits on the manual tree.
//!
//! Every operation takes the current sections and returns a fresh vector, so signal
//! observers always see a new value. Nothing here touches the network.

use crate::models::{Block, BlockKind, NewBlock, Section, Subsection, TreeNode};
use crate::util::next_temp_id;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum TreeError {
    #[error("Title is required")]
    EmptyTitle,

    #[error("Content is required")]
    EmptyContent,

    #[error("Video URL could not be resolved")]
    UnresolvedVideo,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Saving is in progress; edits are paused until it finishes")]
    SaveInProgress,
}

pub(crate) type TreeResult<T> = Result<T, TreeError>;

/// Yes/no gate in front of destructive edits.
pub(crate) trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

/// `window.confirm`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BrowserConfirm;

impl Confirm for BrowserConfirm {
    fn confirm(&self, message: &str) -> bool {
        web_sys::window()
            .and_then(|w| w.confirm_with_message(message).ok())
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum NodeKind {
    Section,
    Subsection,
    Block,
}

/// A persisted node removed locally that still exists on the server.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct RemovedNode {
    pub kind: NodeKind,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Deletion {
    pub sections: Vec<Section>,
    /// Set only when the removed subtree root had a server id.
    pub removed: Option<RemovedNode>,
}

/// temporary id -> server id
pub(crate) type IdMap = BTreeMap<String, String>;

/// Outcome of a sync walk to fold back into the live tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Reconciliation {
    pub ids: IdMap,
    /// Server ids whose pending field edits were accepted.
    pub cleaned: BTreeSet<String>,
}

fn require_title(title: &str) -> TreeResult<&str> {
    let t = title.trim();
    if t.is_empty() {
        Err(TreeError::EmptyTitle)
    } else {
        Ok(t)
    }
}

// ---------------------------------------------------------------- sections

pub(crate) fn create_section(sections: &[Section], title: &str) -> TreeResult<Vec<Section>> {
    let title = require_title(title)?;
    let mut next = sections.to_vec();
    next.push(Section::new_draft(next_temp_id(), title));
    Ok(next)
}

pub(crate) fn rename_section(
    sections: &[Section],
    section_id: &str,
    title: &str,
) -> TreeResult<Vec<Section>> {
    let title = require_title(title)?;
    let mut next = sections.to_vec();
    let s = next
        .iter_mut()
        .find(|s| s.matches(section_id))
        .ok_or_else(|| TreeError::NotFound(format!("Section {section_id}")))?;
    s.title = title.to_string();
    Ok(next)
}

/// `Ok(None)` when the user declined.
pub(crate) fn delete_section(
    sections: &[Section],
    section_id: &str,
    confirm: &impl Confirm,
) -> TreeResult<Option<Deletion>> {
    let target = sections
        .iter()
        .find(|s| s.matches(section_id))
        .ok_or_else(|| TreeError::NotFound(format!("Section {section_id}")))?;

    let msg = format!(
        "Delete section \"{}\" and everything in it?",
        target.title
    );
    if !confirm.confirm(&msg) {
        return Ok(None);
    }

    let removed = target.is_persisted().then(|| RemovedNode {
        kind: NodeKind::Section,
        id: target.id.clone(),
    });

    Ok(Some(Deletion {
        sections: sections
            .iter()
            .filter(|s| !s.matches(section_id))
            .cloned()
            .collect(),
        removed,
    }))
}

// ------------------------------------------------------------- subsections

fn find_subsection_mut<'a>(
    sections: &'a mut [Section],
    subsection_id: &str,
) -> Option<&'a mut Subsection> {
    sections
        .iter_mut()
        .flat_map(|s| s.subsections.iter_mut())
        .find(|ss| ss.matches(subsection_id))
}

pub(crate) fn find_subsection<'a>(
    sections: &'a [Section],
    subsection_id: &str,
) -> Option<&'a Subsection> {
    sections
        .iter()
        .flat_map(|s| s.subsections.iter())
        .find(|ss| ss.matches(subsection_id))
}

pub(crate) fn find_block<'a>(sections: &'a [Section], block_key: &str) -> Option<&'a Block> {
    sections
        .iter()
        .flat_map(|s| s.subsections.iter())
        .flat_map(|ss| ss.blocks.iter())
        .find(|b| b.matches(block_key))
}

pub(crate) fn create_subsection(
    sections: &[Section],
    section_id: &str,
    title: &str,
) -> TreeResult<Vec<Section>> {
    let title = require_title(title)?;
    let mut next = sections.to_vec();
    let s = next
        .iter_mut()
        .find(|s| s.matches(section_id))
        .ok_or_else(|| TreeError::NotFound(format!("Section {section_id}")))?;
    s.subsections
        .push(Subsection::new_draft(next_temp_id(), title));
    Ok(next)
}

pub(crate) fn rename_subsection(
    sections: &[Section],
    subsection_id: &str,
    title: &str,
) -> TreeResult<Vec<Section>> {
    let title = require_title(title)?;
    let mut next = sections.to_vec();
    let ss = find_subsection_mut(&mut next, subsection_id)
        .ok_or_else(|| TreeError::NotFound(format!("Subsection {subsection_id}")))?;
    ss.title = title.to_string();
    ss.dirty = ss.is_persisted();
    Ok(next)
}

pub(crate) fn delete_subsection(
    sections: &[Section],
    subsection_id: &str,
    confirm: &impl Confirm,
) -> TreeResult<Option<Deletion>> {
    let target = find_subsection(sections, subsection_id)
        .ok_or_else(|| TreeError::NotFound(format!("Subsection {subsection_id}")))?;

    let msg = format!(
        "Delete subsection \"{}\" and all of its content?",
        target.title
    );
    if !confirm.confirm(&msg) {
        return Ok(None);
    }

    let removed = target.is_persisted().then(|| RemovedNode {
        kind: NodeKind::Subsection,
        id: target.id.clone(),
    });

    let mut next = sections.to_vec();
    for s in next.iter_mut() {
        s.subsections.retain(|ss| !ss.matches(subsection_id));
    }

    Ok(Some(Deletion {
        sections: next,
        removed,
    }))
}

// ------------------------------------------------------------------ blocks

pub(crate) fn validate_block(block: &NewBlock) -> TreeResult<()> {
    if !block.content.trim().is_empty() {
        return Ok(());
    }
    match block.kind {
        BlockKind::Video => Err(TreeError::UnresolvedVideo),
        BlockKind::Text => Err(TreeError::EmptyContent),
    }
}

pub(crate) fn add_block(
    sections: &[Section],
    subsection_id: &str,
    block: NewBlock,
) -> TreeResult<Vec<Section>> {
    validate_block(&block)?;

    let mut next = sections.to_vec();
    let ss = find_subsection_mut(&mut next, subsection_id)
        .ok_or_else(|| TreeError::NotFound(format!("Subsection {subsection_id}")))?;
    ss.blocks.push(Block::new_draft(next_temp_id(), block));
    Ok(next)
}

/// `block_key` may be the server id or the temporary id the block was created with.
pub(crate) fn update_block_content(
    sections: &[Section],
    block_key: &str,
    content: &str,
) -> TreeResult<Vec<Section>> {
    let mut next = sections.to_vec();
    let b = next
        .iter_mut()
        .flat_map(|s| s.subsections.iter_mut())
        .flat_map(|ss| ss.blocks.iter_mut())
        .find(|b| b.matches(block_key))
        .ok_or_else(|| TreeError::NotFound(format!("Block {block_key}")))?;
    b.content = content.to_string();
    b.dirty = b.is_persisted();
    Ok(next)
}

pub(crate) fn delete_block(
    sections: &[Section],
    block_key: &str,
    confirm: &impl Confirm,
) -> TreeResult<Option<Deletion>> {
    let target = find_block(sections, block_key)
        .ok_or_else(|| TreeError::NotFound(format!("Block {block_key}")))?;

    if !confirm.confirm("Delete this content block?") {
        return Ok(None);
    }

    let removed = target.is_persisted().then(|| RemovedNode {
        kind: NodeKind::Block,
        id: target.id.clone(),
    });

    let mut next = sections.to_vec();
    for ss in next.iter_mut().flat_map(|s| s.subsections.iter_mut()) {
        ss.blocks.retain(|b| !b.matches(block_key));
    }

    Ok(Some(Deletion {
        sections: next,
        removed,
    }))
}

// ---------------------------------------------------------- reconciliation

fn reconcile_node<N: TreeNode>(node: &mut N, r: &Reconciliation) {
    if let Some(real) = r.ids.get(node.id()) {
        node.set_id(real.clone());
    }
}

/// Fold server ids (and accepted edits) into the current tree. Nodes are matched by
/// their temporary id, so edits made while the walk was running survive.
pub(crate) fn reconcile(sections: &[Section], r: &Reconciliation) -> Vec<Section> {
    let mut next = sections.to_vec();
    for s in next.iter_mut() {
        reconcile_node(s, r);
        for ss in s.subsections.iter_mut() {
            reconcile_node(ss, r);
            if r.cleaned.contains(&ss.id) {
                ss.dirty = false;
            }
            for b in ss.blocks.iter_mut() {
                reconcile_node(b, r);
                if r.cleaned.contains(&b.id) {
                    b.dirty = false;
                }
            }
        }
    }
    next
}

/// Add a server-side removal to the queue sent at the start of the next save.
pub(crate) fn queue_removal(pending: &[RemovedNode], removed: RemovedNode) -> Vec<RemovedNode> {
    let mut next = pending.to_vec();
    if !next.contains(&removed) {
        next.push(removed);
    }
    next
}

/// Drop removals the server has acknowledged.
pub(crate) fn settle_removals(pending: &[RemovedNode], deleted: &[RemovedNode]) -> Vec<RemovedNode> {
    pending
        .iter()
        .filter(|n| !deleted.contains(n))
        .cloned()
        .collect()
}

fn created_id<N: TreeNode>(node: &N, r: &Reconciliation) -> Option<String> {
    r.ids.get(node.id()).cloned()
}

/// Nodes the walk created on the server that are no longer in the live tree.
///
/// `sent` is the tree handed to the walk. Only the topmost missing node of a
/// subtree is reported; the backend removes its children with it.
pub(crate) fn orphaned_creations(
    sent: &[Section],
    live: &[Section],
    r: &Reconciliation,
) -> Vec<RemovedNode> {
    let mut out = vec![];
    for s in sent {
        if !live.iter().any(|l| l.matches(s.local_key())) {
            if let Some(id) = created_id(s, r) {
                out.push(RemovedNode {
                    kind: NodeKind::Section,
                    id,
                });
            }
            continue;
        }
        for ss in &s.subsections {
            if find_subsection(live, ss.local_key()).is_none() {
                if let Some(id) = created_id(ss, r) {
                    out.push(RemovedNode {
                        kind: NodeKind::Subsection,
                        id,
                    });
                }
                continue;
            }
            for b in &ss.blocks {
                if find_block(live, b.local_key()).is_none() {
                    if let Some(id) = created_id(b, r) {
                        out.push(RemovedNode {
                            kind: NodeKind::Block,
                            id,
                        });
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn all_persisted(sections: &[Section]) -> bool {
    sections.iter().all(|s| {
        s.is_persisted()
            && s.subsections
                .iter()
                .all(|ss| ss.is_persisted() && ss.blocks.iter().all(|b| b.is_persisted()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::is_temp_id;

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    fn sample() -> Vec<Section> {
        let t = create_section(&[], "Intro").unwrap();
        let t = create_section(&t, "Prep").unwrap();
        let intro = t[0].id.clone();
        let t = create_subsection(&t, &intro, "Step 1").unwrap();
        let t = create_subsection(&t, &intro, "Step 2").unwrap();
        let step1 = t[0].subsections[0].id.clone();
        add_block(&t, &step1, NewBlock::text("Hello")).unwrap()
    }

    #[test]
    fn test_create_appends_with_temp_ids_and_leaves_input_untouched() {
        let t0: Vec<Section> = vec![];
        let t1 = create_section(&t0, "  Intro ").unwrap();
        assert!(t0.is_empty());
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].title, "Intro");
        assert!(is_temp_id(&t1[0].id));
        assert_eq!(t1[0].temp_id.as_deref(), Some(t1[0].id.as_str()));
    }

    #[test]
    fn test_empty_titles_are_rejected() {
        assert_eq!(create_section(&[], "   "), Err(TreeError::EmptyTitle));
        let t = sample();
        assert_eq!(
            rename_subsection(&t, &t[0].subsections[0].id, ""),
            Err(TreeError::EmptyTitle)
        );
    }

    #[test]
    fn test_rename_updates_only_target() {
        let t = sample();
        let t2 = rename_section(&t, &t[1].id, "Preparation").unwrap();
        assert_eq!(t2[0].title, "Intro");
        assert_eq!(t2[1].title, "Preparation");

        let sub = t2[0].subsections[1].id.clone();
        let t3 = rename_subsection(&t2, &sub, "Step two").unwrap();
        assert_eq!(t3[0].subsections[1].title, "Step two");
        assert!(!t3[0].subsections[1].dirty);
    }

    #[test]
    fn test_delete_section_removes_descendants_after_confirmation() {
        let t = sample();
        let intro = t[0].id.clone();

        assert_eq!(delete_section(&t, &intro, &no).unwrap(), None);

        let d = delete_section(&t, &intro, &yes).unwrap().unwrap();
        assert_eq!(d.sections.len(), 1);
        assert_eq!(d.sections[0].title, "Prep");
        assert!(find_subsection(&d.sections, &t[0].subsections[0].id).is_none());
        assert_eq!(d.removed, None);
    }

    #[test]
    fn test_delete_persisted_subsection_reports_server_id() {
        let mut t = sample();
        t[0].subsections[0].set_id("77".to_string());

        let d = delete_subsection(&t, "77", &yes).unwrap().unwrap();
        assert_eq!(d.sections[0].subsections.len(), 1);
        assert_eq!(d.sections[0].subsections[0].title, "Step 2");
        assert_eq!(
            d.removed,
            Some(RemovedNode {
                kind: NodeKind::Subsection,
                id: "77".to_string()
            })
        );
    }

    #[test]
    fn test_mixed_sequence_leaves_exactly_survivors() {
        let mut t: Vec<Section> = vec![];
        for i in 0..5 {
            t = create_section(&t, &format!("S{i}")).unwrap();
            let sid = t[i].id.clone();
            t = create_subsection(&t, &sid, "child").unwrap();
        }
        let ids: Vec<String> = t.iter().map(|s| s.id.clone()).collect();
        t = delete_section(&t, &ids[1], &yes).unwrap().unwrap().sections;
        t = delete_section(&t, &ids[3], &yes).unwrap().unwrap().sections;
        t = rename_section(&t, &ids[4], "Last").unwrap();

        let titles: Vec<&str> = t.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["S0", "S2", "Last"]);
        assert!(t.iter().all(|s| s.subsections.len() == 1));
    }

    #[test]
    fn test_unresolved_video_is_rejected_without_mutation() {
        let t = sample();
        let step2 = t[0].subsections[1].id.clone();
        let r = add_block(&t, &step2, NewBlock::video("v1", ""));
        assert_eq!(r, Err(TreeError::UnresolvedVideo));
        assert!(t[0].subsections[1].blocks.is_empty());

        assert_eq!(
            add_block(&t, &step2, NewBlock::text("  ")),
            Err(TreeError::EmptyContent)
        );
    }

    #[test]
    fn test_update_block_content_by_temp_or_server_id() {
        let t = sample();
        let temp = t[0].subsections[0].blocks[0].id.clone();
        let t = update_block_content(&t, &temp, "Hi").unwrap();
        assert_eq!(t[0].subsections[0].blocks[0].content, "Hi");
        assert!(!t[0].subsections[0].blocks[0].dirty);

        let mut r = Reconciliation::default();
        r.ids.insert(temp.clone(), "501".to_string());
        let t = reconcile(&t, &r);

        let t = update_block_content(&t, &temp, "by temp").unwrap();
        assert_eq!(t[0].subsections[0].blocks[0].content, "by temp");
        let t = update_block_content(&t, "501", "by server").unwrap();
        assert_eq!(t[0].subsections[0].blocks[0].content, "by server");
        assert!(t[0].subsections[0].blocks[0].dirty);
    }

    #[test]
    fn test_reconcile_replaces_ids_and_clears_cleaned_flags() {
        let t = sample();
        let mut r = Reconciliation::default();
        r.ids.insert(t[0].id.clone(), "1".to_string());
        r.ids.insert(t[1].id.clone(), "2".to_string());
        r.ids.insert(t[0].subsections[0].id.clone(), "11".to_string());
        r.ids.insert(t[0].subsections[1].id.clone(), "12".to_string());
        r.ids
            .insert(t[0].subsections[0].blocks[0].id.clone(), "111".to_string());

        let t2 = reconcile(&t, &r);
        assert!(all_persisted(&t2));
        assert_eq!(t2[0].subsections[0].blocks[0].id, "111");
        assert!(t2[0].subsections[0].matches(&t[0].subsections[0].id));

        let t3 = rename_subsection(&t2, "12", "Step B").unwrap();
        assert!(t3[0].subsections[1].dirty);
        let mut cleaned = Reconciliation::default();
        cleaned.cleaned.insert("12".to_string());
        assert!(!reconcile(&t3, &cleaned)[0].subsections[1].dirty);
    }

    #[test]
    fn test_removal_queue_dedupes_and_settles() {
        let a = RemovedNode {
            kind: NodeKind::Block,
            id: "7".to_string(),
        };
        let b = RemovedNode {
            kind: NodeKind::Section,
            id: "1".to_string(),
        };
        let q = queue_removal(&[], a.clone());
        let q = queue_removal(&q, a.clone());
        let q = queue_removal(&q, b.clone());
        assert_eq!(q, vec![a.clone(), b.clone()]);
        assert_eq!(settle_removals(&q, &[a]), vec![b]);
    }

    #[test]
    fn test_draft_deleted_while_walk_created_it_is_reported_for_removal() {
        let sent = create_section(&[], "Intro").unwrap();
        let sent = create_subsection(&sent, &sent[0].id.clone(), "Step 1").unwrap();
        let temp = sent[0].id.clone();
        let sub_temp = sent[0].subsections[0].id.clone();

        let mut r = Reconciliation::default();
        r.ids.insert(temp.clone(), "sec-1".to_string());
        r.ids.insert(sub_temp, "sub-2".to_string());

        // The walk still holds `sent`; the user removed the section meanwhile.
        let deletion = delete_section(&sent, &temp, &yes).unwrap().unwrap();
        assert_eq!(deletion.removed, None);
        let live = reconcile(&deletion.sections, &r);
        assert!(live.is_empty());

        assert_eq!(
            orphaned_creations(&sent, &live, &r),
            vec![RemovedNode {
                kind: NodeKind::Section,
                id: "sec-1".to_string(),
            }]
        );
    }

    #[test]
    fn test_orphan_scan_ignores_surviving_and_uncreated_nodes() {
        let sent = create_section(&[], "Intro").unwrap();
        let sec = sent[0].id.clone();
        let sent = create_subsection(&sent, &sec, "A").unwrap();
        let sent = create_subsection(&sent, &sec, "B").unwrap();
        let a = sent[0].subsections[0].id.clone();
        let b = sent[0].subsections[1].id.clone();

        let mut r = Reconciliation::default();
        r.ids.insert(sec, "sec-1".to_string());
        r.ids.insert(a.clone(), "sub-2".to_string());

        // B was never created, A was created and then deleted.
        let live = delete_subsection(&sent, &a, &yes).unwrap().unwrap().sections;
        let live = delete_subsection(&live, &b, &yes).unwrap().unwrap().sections;
        assert_eq!(
            orphaned_creations(&sent, &live, &r),
            vec![RemovedNode {
                kind: NodeKind::Subsection,
                id: "sub-2".to_string(),
            }]
        );
    }
}
