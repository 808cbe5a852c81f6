use crate::element::Widget;
use crate::matcher;
use crate::selector::{SelectorPart, SpatialRelation};
use tracing::debug;

/// Default edge-to-edge distance threshold for the `near` relation, in the
/// provider's coordinate units (pixels for every known provider).
pub const DEFAULT_NEAR_THRESHOLD: f64 = 50.0;

/// Axis-aligned bounding rectangle derived from a widget's position and
/// size, both defaulting to `(0, 0)` when the provider reports nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn from_widget(widget: &Widget) -> Self {
        let (x, y) = widget.position();
        let (width, height) = widget.size();
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    /// Minimum edge-to-edge Euclidean distance; 0 when the rectangles
    /// overlap or touch.
    pub fn edge_distance(&self, other: &Rect) -> f64 {
        let x_dist = (self.left - other.right).max(other.left - self.right).max(0.0);
        let y_dist = (self.top - other.bottom).max(other.top - self.bottom).max(0.0);
        (x_dist * x_dist + y_dist * y_dist).sqrt()
    }

    fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

/// True if `candidate` stands in `relation` to `target`.
///
/// Directional relations compare opposing edges and treat touching edges as
/// satisfying the relation (`above` means candidate bottom ≤ target top,
/// and so on).
pub fn relation_holds(
    relation: SpatialRelation,
    candidate: &Rect,
    target: &Rect,
    near_threshold: f64,
) -> bool {
    match relation {
        SpatialRelation::Above => candidate.bottom <= target.top,
        SpatialRelation::Below => candidate.top >= target.bottom,
        SpatialRelation::LeftOf => candidate.right <= target.left,
        SpatialRelation::RightOf => candidate.left >= target.right,
        SpatialRelation::Inside => target.contains_rect(candidate),
        SpatialRelation::Contains => candidate.contains_rect(target),
        SpatialRelation::Near => candidate.edge_distance(target) <= near_threshold,
    }
}

/// Evaluate a selector with a spatial clause against the candidate pool.
///
/// The target selector is resolved against the full pool first; with no
/// target matches the result is empty. A pool widget is then included when
/// it matches the subject part (spatial clause ignored) and the relation
/// holds against **any** resolved target.
pub fn evaluate(pool: &[Widget], part: &SelectorPart, near_threshold: f64) -> Vec<Widget> {
    let Some(clause) = &part.spatial else {
        return pool
            .iter()
            .filter(|widget| matcher::matches(widget, part))
            .cloned()
            .collect();
    };

    let target_rects: Vec<Rect> = pool
        .iter()
        .filter(|widget| matcher::matches(widget, &clause.target))
        .map(Rect::from_widget)
        .collect();

    if target_rects.is_empty() {
        debug!(
            relation = clause.relation.as_str(),
            "no widgets match spatial target, query yields nothing"
        );
        return Vec::new();
    }

    pool.iter()
        .filter(|widget| matcher::matches(widget, part))
        .filter(|widget| {
            let rect = Rect::from_widget(widget);
            target_rects
                .iter()
                .any(|target| relation_holds(clause.relation, &rect, target, near_threshold))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod spatial_tests {
    use super::*;
    use crate::element::WidgetSnapshot;

    fn rect(left: f64, top: f64, right: f64, bottom: f64) -> Rect {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn test_above_and_below() {
        // A at (0,0) 10x10, B at (0,20) 10x10.
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(0.0, 20.0, 10.0, 30.0);
        assert!(relation_holds(SpatialRelation::Above, &a, &b, DEFAULT_NEAR_THRESHOLD));
        assert!(!relation_holds(SpatialRelation::Below, &a, &b, DEFAULT_NEAR_THRESHOLD));
        assert!(relation_holds(SpatialRelation::Below, &b, &a, DEFAULT_NEAR_THRESHOLD));
    }

    #[test]
    fn test_left_of_and_right_of() {
        let left = rect(0.0, 0.0, 10.0, 10.0);
        let right = rect(30.0, 0.0, 40.0, 10.0);
        assert!(relation_holds(SpatialRelation::LeftOf, &left, &right, DEFAULT_NEAR_THRESHOLD));
        assert!(relation_holds(SpatialRelation::RightOf, &right, &left, DEFAULT_NEAR_THRESHOLD));
        assert!(!relation_holds(SpatialRelation::LeftOf, &right, &left, DEFAULT_NEAR_THRESHOLD));
    }

    #[test]
    fn test_touching_edges_satisfy_directional_relations() {
        let upper = rect(0.0, 0.0, 10.0, 10.0);
        let lower = rect(0.0, 10.0, 10.0, 20.0);
        assert!(relation_holds(SpatialRelation::Above, &upper, &lower, DEFAULT_NEAR_THRESHOLD));
    }

    #[test]
    fn test_inside_and_contains() {
        let outer = rect(0.0, 0.0, 100.0, 100.0);
        let inner = rect(10.0, 10.0, 20.0, 20.0);
        assert!(relation_holds(SpatialRelation::Inside, &inner, &outer, DEFAULT_NEAR_THRESHOLD));
        assert!(relation_holds(SpatialRelation::Contains, &outer, &inner, DEFAULT_NEAR_THRESHOLD));
        assert!(!relation_holds(SpatialRelation::Inside, &outer, &inner, DEFAULT_NEAR_THRESHOLD));
    }

    #[test]
    fn test_edge_distance() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(13.0, 14.0, 20.0, 20.0);
        // 3 horizontal, 4 vertical.
        assert!((a.edge_distance(&b) - 5.0).abs() < 1e-9);

        let overlapping = rect(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.edge_distance(&overlapping), 0.0);
    }

    #[test]
    fn test_near_threshold() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let close = rect(40.0, 0.0, 50.0, 10.0);
        let far = rect(100.0, 0.0, 110.0, 10.0);
        assert!(relation_holds(SpatialRelation::Near, &a, &close, DEFAULT_NEAR_THRESHOLD));
        assert!(!relation_holds(SpatialRelation::Near, &a, &far, DEFAULT_NEAR_THRESHOLD));
        assert!(relation_holds(SpatialRelation::Near, &a, &far, 100.0));
    }

    #[test]
    fn test_evaluate_empty_when_target_missing() {
        let pool: Vec<Widget> = vec![
            WidgetSnapshot::new("button").with_bounds(0.0, 0.0, 10.0, 10.0).into(),
        ];
        let part = SelectorPart::parse("button above dialog").unwrap();
        assert!(evaluate(&pool, &part, DEFAULT_NEAR_THRESHOLD).is_empty());
    }

    #[test]
    fn test_evaluate_any_target_is_enough() {
        let pool: Vec<Widget> = vec![
            WidgetSnapshot::new("button")
                .with_name("subject")
                .with_bounds(0.0, 0.0, 10.0, 10.0)
                .into(),
            // One label the button is above, one it is not.
            WidgetSnapshot::new("label")
                .with_name("under")
                .with_bounds(0.0, 50.0, 10.0, 10.0)
                .into(),
            WidgetSnapshot::new("label")
                .with_name("over")
                .with_bounds(0.0, -50.0, 10.0, 10.0)
                .into(),
        ];
        let part = SelectorPart::parse("button above label").unwrap();
        let found = evaluate(&pool, &part, DEFAULT_NEAR_THRESHOLD);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "subject");
    }

    #[test]
    fn test_missing_geometry_defaults_to_origin() {
        // Both rectangles collapse to (0,0,0,0): distance 0, so `near` holds.
        let a: Widget = WidgetSnapshot::new("button").into();
        let b: Widget = WidgetSnapshot::new("label").into();
        let ra = Rect::from_widget(&a);
        let rb = Rect::from_widget(&b);
        assert_eq!(ra, rect(0.0, 0.0, 0.0, 0.0));
        assert!(relation_holds(SpatialRelation::Near, &ra, &rb, DEFAULT_NEAR_THRESHOLD));
    }
}
