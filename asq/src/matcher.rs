use crate::element::Widget;
use crate::selector::{Pseudo, SelectorPart};

/// Check a single widget against a simple selector.
///
/// Checks run in a fixed order: element type, then attribute predicates,
/// then pseudo-selector predicates, all combined with logical AND. Absent
/// widget fields degrade to their documented defaults, so this never fails.
/// A spatial clause on the part is ignored here; the spatial evaluator owns
/// it. Positional pseudo-selectors (`:first`/`:last`) are also ignored:
/// they only make sense against the whole result set and are applied by
/// [`apply_positional`].
pub fn matches(widget: &Widget, part: &SelectorPart) -> bool {
    // Type token is a case-insensitive substring of the role, so "button"
    // also matches "push button".
    if let Some(element_type) = &part.element_type {
        let role = widget.role().to_lowercase();
        if !role.contains(&element_type.to_lowercase()) {
            return false;
        }
    }

    for attr in &part.attributes {
        let value = widget.attribute(&attr.name);
        if !attr.op.evaluate(&value, &attr.value) {
            return false;
        }
    }

    for pseudo in &part.pseudos {
        if !pseudo_holds(widget, *pseudo) {
            return false;
        }
    }

    true
}

fn pseudo_holds(widget: &Widget, pseudo: Pseudo) -> bool {
    match pseudo {
        Pseudo::Visible => widget.is_visible(),
        Pseudo::Hidden => !widget.is_visible(),
        Pseudo::Enabled => widget.is_enabled(),
        Pseudo::Disabled => !widget.is_enabled(),
        Pseudo::Focused => widget.is_focused(),
        Pseudo::Selected => widget.is_selected(),
        Pseudo::Checked => widget.is_checked(),
        Pseudo::Empty => widget.text().trim().is_empty(),
        // Positional: evaluated over the result set, not per widget.
        Pseudo::First | Pseudo::Last => true,
    }
}

/// Reduce a matched sequence according to `:first`/`:last`.
///
/// Result-set order is preserved from the candidate pool; `:first` keeps the
/// head, `:last` the tail. Both on one selector can only agree on a
/// single-element sequence.
pub fn apply_positional(matched: Vec<Widget>, part: &SelectorPart) -> Vec<Widget> {
    if !part.has_positional_pseudo() || matched.is_empty() {
        return matched;
    }

    let wants_first = part.pseudos.contains(&Pseudo::First);
    let wants_last = part.pseudos.contains(&Pseudo::Last);

    if wants_first && wants_last {
        if matched.len() == 1 {
            return matched;
        }
        return Vec::new();
    }

    let kept = if wants_first {
        matched.into_iter().next()
    } else {
        matched.into_iter().next_back()
    };
    kept.into_iter().collect()
}
