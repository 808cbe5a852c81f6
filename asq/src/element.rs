use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Interface for accessibility-provider widget implementations.
///
/// Every getter is optional: providers expose whatever the underlying
/// accessibility tree happens to report, and the query core substitutes
/// documented defaults for anything absent (see [`Widget`]).
pub trait WidgetImpl: Send + Sync + Debug {
    fn name(&self) -> Option<String>;
    fn role(&self) -> Option<String>;
    fn text(&self) -> Option<String>;
    /// Top-left corner in screen coordinates.
    fn position(&self) -> Option<(f64, f64)>;
    /// Width and height.
    fn size(&self) -> Option<(f64, f64)>;
    fn is_visible(&self) -> Option<bool>;
    fn is_enabled(&self) -> Option<bool>;
    fn is_focused(&self) -> Option<bool>;
    fn is_selected(&self) -> Option<bool>;
    fn is_checked(&self) -> Option<bool>;
}

/// Read-only handle to a widget in a live accessibility tree.
///
/// The core never owns or mutates widgets; it only reads snapshots supplied
/// by the provider. Accessors on this type never fail: missing string fields
/// read as `""`, missing geometry as `(0.0, 0.0)`, `visible`/`enabled`
/// default to `true` and the remaining state flags to `false`.
#[derive(Clone, Debug)]
pub struct Widget {
    inner: Arc<dyn WidgetImpl>,
}

impl Widget {
    pub fn new(inner: impl WidgetImpl + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> String {
        self.inner.name().unwrap_or_default()
    }

    pub fn role(&self) -> String {
        self.inner.role().unwrap_or_default()
    }

    pub fn text(&self) -> String {
        self.inner.text().unwrap_or_default()
    }

    pub fn position(&self) -> (f64, f64) {
        self.inner.position().unwrap_or((0.0, 0.0))
    }

    pub fn size(&self) -> (f64, f64) {
        self.inner.size().unwrap_or((0.0, 0.0))
    }

    pub fn is_visible(&self) -> bool {
        self.inner.is_visible().unwrap_or(true)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled().unwrap_or(true)
    }

    pub fn is_focused(&self) -> bool {
        self.inner.is_focused().unwrap_or(false)
    }

    pub fn is_selected(&self) -> bool {
        self.inner.is_selected().unwrap_or(false)
    }

    pub fn is_checked(&self) -> bool {
        self.inner.is_checked().unwrap_or(false)
    }

    /// String view of a named field, as read by attribute predicates.
    ///
    /// Boolean fields render as `"true"`/`"false"`; unknown names read as
    /// the empty string rather than failing.
    pub fn attribute(&self, name: &str) -> String {
        match name {
            "name" => self.name(),
            "role" => self.role(),
            "text" => self.text(),
            "visible" => self.is_visible().to_string(),
            "enabled" => self.is_enabled().to_string(),
            "focused" => self.is_focused().to_string(),
            "selected" => self.is_selected().to_string(),
            "checked" => self.is_checked().to_string(),
            _ => String::new(),
        }
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        if name.is_empty() {
            write!(f, "{}", self.role())
        } else {
            write!(f, "{} \"{}\"", self.role(), name)
        }
    }
}

/// Source of the candidate widget pool for queries.
///
/// This is the single seam to the external accessibility binding: the engine
/// asks for a flat snapshot of the current tree and does everything else
/// itself. Implementations are expected to serialize access to the live
/// connection on their side.
pub trait WidgetProvider: Send + Sync {
    fn widgets(&self) -> Vec<Widget>;
}

/// In-memory provider over a fixed list of widgets.
///
/// Useful for tests and for callers that already hold a tree snapshot.
pub struct SnapshotPool {
    widgets: Vec<Widget>,
}

impl SnapshotPool {
    pub fn new(widgets: Vec<Widget>) -> Self {
        Self { widgets }
    }
}

impl WidgetProvider for SnapshotPool {
    fn widgets(&self) -> Vec<Widget> {
        self.widgets.clone()
    }
}

/// Plain-data widget for in-memory trees and serialization.
///
/// Contains the same fields a provider handle exposes but no live
/// connection; fields absent in the source tree stay `None` and deserialize
/// that way.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WidgetSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl WidgetSnapshot {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_bounds(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.position = Some((x, y));
        self.size = Some((width, height));
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_focused(mut self, focused: bool) -> Self {
        self.focused = Some(focused);
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }
}

impl WidgetImpl for WidgetSnapshot {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn role(&self) -> Option<String> {
        self.role.clone()
    }

    fn text(&self) -> Option<String> {
        self.text.clone()
    }

    fn position(&self) -> Option<(f64, f64)> {
        self.position
    }

    fn size(&self) -> Option<(f64, f64)> {
        self.size
    }

    fn is_visible(&self) -> Option<bool> {
        self.visible
    }

    fn is_enabled(&self) -> Option<bool> {
        self.enabled
    }

    fn is_focused(&self) -> Option<bool> {
        self.focused
    }

    fn is_selected(&self) -> Option<bool> {
        self.selected
    }

    fn is_checked(&self) -> Option<bool> {
        self.checked
    }
}

impl From<WidgetSnapshot> for Widget {
    fn from(snapshot: WidgetSnapshot) -> Self {
        Widget::new(snapshot)
    }
}
