//! Three-way text merging.
//!
//! Remote changes (base → remote) are folded into the local text. Regions
//! that merge cleanly are combined; regions that cannot be reconciled are
//! bracketed with `<<<<<<< LOCAL` / `=======` / `>>>>>>> REMOTE` markers and
//! the document is still written out, so nothing is ever lost silently.

/// Result of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged (or conflict-marked) document.
    pub text: String,
    /// True when every region merged without markers.
    pub clean: bool,
}

/// Merge `remote` into `local` using `base` as the common ancestor.
///
/// An empty `base` degrades to a two-way merge: with no shared history both
/// sides count as wholesale additions, so differing documents come back
/// conflict-marked.
pub fn merge_texts(base: &str, local: &str, remote: &str) -> MergeOutcome {
    match diffy::merge(base, local, remote) {
        Ok(text) => MergeOutcome { text, clean: true },
        Err(conflicted) => MergeOutcome {
            text: relabel_markers(&conflicted),
            clean: false,
        },
    }
}

/// Rewrite merge markers to name the two sides of this protocol.
///
/// Any base section (`|||||||` style) is dropped so the document only shows
/// the two versions a reader can act on.
fn relabel_markers(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_base_section = false;

    for line in text.split('\n') {
        if line.starts_with("<<<<<<<") {
            out.push("<<<<<<< LOCAL".to_string());
        } else if line.starts_with(">>>>>>>") {
            out.push(">>>>>>> REMOTE".to_string());
        } else if line.starts_with("|||||||") {
            in_base_section = true;
        } else if line.starts_with("=======") {
            in_base_section = false;
            out.push("=======".to_string());
        } else if !in_base_section {
            out.push(line.to_string());
        }
    }

    out.join("\n")
}
