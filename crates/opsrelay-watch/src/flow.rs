//! Routing flows — a small interpreted decision graph over file batches.
//!
//! A flow is a set of nodes and directed edges stored as JSON. Evaluation
//! starts at the single `save_pdf` entry node with the whole file batch,
//! partitions the batch at condition nodes by case-insensitive filename
//! substring, and sends chunked notifications at action nodes. Every
//! matching branch executes; sends are sequential so delivery order
//! follows discovery order.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;

use opsrelay_core::traits::NotifySink;
use opsrelay_core::types::{FileRecord, ForwardOutcome};

use crate::chunk::{chunk_messages, format_entry};
use crate::cycle::clip;

/// Recursion bound: a well-formed flow has no cycles, but a malformed one
/// must still terminate.
const MAX_DEPTH: usize = 64;

const DEFAULT_HEADER: &str = "New PDF files:";

static DAILY_COUNTS: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)daily[\s_\-]*counts").expect("daily counts pattern")
});

/// A node in the routing flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Node kinds. Adding a kind is a compile-time exhaustiveness failure in
/// the evaluator, not a silently ignored branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum NodeKind {
    /// The single entry node; not itself a decision.
    SavePdf,
    /// Partition the current file set by substring match on the name.
    #[serde(rename_all = "camelCase")]
    If {
        #[serde(default)]
        value: String,
    },
    /// Send the current file set to a Messenger recipient.
    #[serde(rename_all = "camelCase")]
    Facebook {
        #[serde(default)]
        recipient_id: String,
        #[serde(default)]
        message: String,
    },
    /// Like `Facebook`, but restricted to daily-counts reports.
    #[serde(rename_all = "camelCase")]
    FacebookDailyCounts {
        #[serde(default)]
        recipient_id: String,
        #[serde(default)]
        message: String,
    },
}

/// Branch label on a condition node's out-edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    Yes,
    No,
}

/// A directed edge. Unlabeled edges continue unconditionally with the
/// current file set; labeled edges leave condition nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub from_id: String,
    pub to_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<EdgeLabel>,
}

/// A stored routing flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl Flow {
    /// The entry node, when the flow has one.
    pub fn entry(&self) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| matches!(n.kind, NodeKind::SavePdf))
    }

    fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes reachable from `from` over edges with the given label.
    fn targets(&self, from: &str, label: Option<EdgeLabel>) -> Vec<&FlowNode> {
        self.edges
            .iter()
            .filter(|e| e.from_id == from && e.label == label)
            .filter_map(|e| self.node(&e.to_id))
            .collect()
    }
}

/// Result of evaluating a flow against a file batch.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub ok: bool,
    pub reason: Option<String>,
    pub results: Vec<ForwardOutcome>,
}

/// Evaluate a flow against a batch of files, sending through `sink` at
/// action nodes. Returns the flat, append-ordered list of per-action
/// outcomes. A flow without an entry node produces no side effects.
pub async fn evaluate(flow: &Flow, files: &[FileRecord], sink: &dyn NotifySink) -> FlowReport {
    let Some(entry) = flow.entry() else {
        return FlowReport {
            ok: false,
            reason: Some("no_save_pdf_node".into()),
            results: Vec::new(),
        };
    };

    let mut results = Vec::new();
    for next in flow.targets(&entry.id, None) {
        results.extend(run_node(flow, next, files.to_vec(), sink, 0).await);
    }
    FlowReport {
        ok: true,
        reason: None,
        results,
    }
}

/// Execute one node with its current file set, returning the outcomes
/// produced in this branch. Pure recursion: outcomes are returned and
/// concatenated by the caller, never accumulated through shared state.
fn run_node<'a>(
    flow: &'a Flow,
    node: &'a FlowNode,
    files: Vec<FileRecord>,
    sink: &'a dyn NotifySink,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Vec<ForwardOutcome>> + Send + 'a>> {
    Box::pin(async move {
        if depth >= MAX_DEPTH {
            tracing::warn!("Flow recursion limit reached at node '{}'", node.id);
            return Vec::new();
        }
        let mut out = Vec::new();

        match &node.kind {
            NodeKind::SavePdf => {
                // A nested entry node is a plain pass-through.
                for next in flow.targets(&node.id, None) {
                    out.extend(run_node(flow, next, files.clone(), sink, depth + 1).await);
                }
            }
            NodeKind::If { value } => {
                // An empty condition value matches every name, so the
                // whole set flows to "yes". Intentional degenerate case.
                let cond = value.trim().to_lowercase();
                let (yes, no): (Vec<FileRecord>, Vec<FileRecord>) = files
                    .into_iter()
                    .partition(|f| f.name.to_lowercase().contains(&cond));

                if !yes.is_empty() {
                    for next in flow.targets(&node.id, Some(EdgeLabel::Yes)) {
                        out.extend(run_node(flow, next, yes.clone(), sink, depth + 1).await);
                    }
                }
                if !no.is_empty() {
                    for next in flow.targets(&node.id, Some(EdgeLabel::No)) {
                        out.extend(run_node(flow, next, no.clone(), sink, depth + 1).await);
                    }
                }
            }
            NodeKind::Facebook {
                recipient_id,
                message,
            } => {
                let outcome = send_batch(&files, recipient_id, message, false, sink).await;
                let stop = !outcome.ok && outcome.reason.as_deref() == Some("missing_recipient");
                out.push(outcome);
                if stop {
                    return out;
                }
                // Downstream nodes receive the original, unfiltered set.
                for next in flow.targets(&node.id, None) {
                    out.extend(run_node(flow, next, files.clone(), sink, depth + 1).await);
                }
            }
            NodeKind::FacebookDailyCounts {
                recipient_id,
                message,
            } => {
                let outcome = send_batch(&files, recipient_id, message, true, sink).await;
                let stop = !outcome.ok && outcome.reason.as_deref() == Some("missing_recipient");
                out.push(outcome);
                if stop {
                    return out;
                }
                for next in flow.targets(&node.id, None) {
                    out.extend(run_node(flow, next, files.clone(), sink, depth + 1).await);
                }
            }
        }
        out
    })
}

/// Send a batch to one recipient, chunked. `daily_only` restricts the
/// batch to daily-counts reports first.
async fn send_batch(
    files: &[FileRecord],
    recipient_id: &str,
    header: &str,
    daily_only: bool,
    sink: &dyn NotifySink,
) -> ForwardOutcome {
    let recipient = recipient_id.trim();
    if recipient.is_empty() {
        return ForwardOutcome::failed("missing_recipient");
    }

    let selected: Vec<&FileRecord> = if daily_only {
        files.iter().filter(|f| is_daily_counts(&f.name)).collect()
    } else {
        files.iter().collect()
    };
    if selected.is_empty() {
        return ForwardOutcome::skipped(recipient, "no_files");
    }

    let header = if header.trim().is_empty() {
        DEFAULT_HEADER
    } else {
        header
    };
    let entries: Vec<String> = selected.iter().map(|f| format_entry(f)).collect();
    for text in chunk_messages(header, &entries) {
        if let Err(e) = sink.send(recipient, &text).await {
            tracing::warn!("Flow send to {recipient} failed: {e}");
            return ForwardOutcome::send_error(recipient, clip(&e.to_string()));
        }
    }
    ForwardOutcome::sent(recipient, selected.len())
}

fn is_daily_counts(name: &str) -> bool {
    DAILY_COUNTS.is_match(name)
}
