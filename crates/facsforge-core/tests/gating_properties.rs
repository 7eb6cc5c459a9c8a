//! ゲート・集団解決・閾値推定の不変条件

use facsforge_core::gate::{Gate, GateDef, Point, Polygon};
use facsforge_core::{EventTable, PopulationDef, ThresholdEstimator, ThresholdTable, resolve_populations};
use proptest::prelude::*;

fn arb_coord() -> impl Strategy<Value = f64> {
    (-1000i32..1000).prop_map(|v| v as f64 * 0.5)
}

fn arb_point() -> impl Strategy<Value = [f64; 2]> {
    (arb_coord(), arb_coord()).prop_map(|(x, y)| [x, y])
}

fn arb_events(max_rows: usize) -> impl Strategy<Value = EventTable> {
    prop::collection::vec((arb_coord(), arb_coord(), arb_coord()), 0..max_rows).prop_map(|rows| {
        EventTable::from_rows(
            vec!["X".into(), "Y".into(), "CD3".into()],
            rows.into_iter().map(|(x, y, z)| vec![x, y, z]).collect(),
        )
        .unwrap()
    })
}

fn rect_def(vertices: Vec<[f64; 2]>) -> GateDef {
    GateDef {
        kind: "rectangle".into(),
        channels: vec!["X".into(), "Y".into()],
        vertices,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_rectangle_ignores_corner_order_and_duplicates(
        a in arb_point(),
        b in arb_point(),
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
        dup in 0usize..4,
        events in arb_events(64),
    ) {
        let corners = [a, [a[0], b[1]], b, [b[0], a[1]]];
        let shuffled: Vec<[f64; 2]> = order.iter().map(|&i| corners[i]).collect();
        let mut duplicated = shuffled.clone();
        duplicated.push(corners[dup]);

        let two = Gate::from_def(&rect_def(vec![a, b]), "P").unwrap();
        let four = Gate::from_def(&rect_def(shuffled), "P").unwrap();
        let five = Gate::from_def(&rect_def(duplicated), "P").unwrap();

        let expected = two.apply(&events, "P").unwrap();
        let got4 = four.apply(&events, "P").unwrap();
        let got5 = five.apply(&events, "P").unwrap();
        prop_assert_eq!(got4.row_ids(), expected.row_ids());
        prop_assert_eq!(got5.row_ids(), expected.row_ids());
    }

    #[test]
    fn prop_polygon_membership_invariant_under_rotation(
        vertices in prop::collection::vec(arb_point(), 3..8),
        shift in 0usize..8,
        queries in prop::collection::vec(arb_point(), 1..32),
    ) {
        let points: Vec<Point> = vertices.iter().copied().map(Point::from).collect();
        let mut rotated = points.clone();
        let k = shift % rotated.len();
        rotated.rotate_left(k);

        let base = Polygon::new(points).unwrap();
        let turned = Polygon::new(rotated).unwrap();
        for [x, y] in queries {
            prop_assert_eq!(base.contains(x, y), turned.contains(x, y));
        }
        // 頂点は常に内側
        for v in base.vertices() {
            prop_assert!(base.contains(v.x, v.y));
        }
    }

    #[test]
    fn prop_children_are_subsets_of_parents(
        events in arb_events(128),
        lo in arb_coord(),
        width in 0i32..1000,
        cd3 in arb_coord(),
        negative in any::<bool>(),
    ) {
        let gate = Gate::Threshold { channel: "X".into(), min: Some(lo), max: Some(lo + width as f64) };
        let mut child = PopulationDef::new("Child").with_parent("Parent");
        child = if negative { child.with_negative(["CD3"]) } else { child.with_positive(["CD3"]) };
        let defs = vec![
            child,
            PopulationDef::new("Parent").with_gate(gate),
            PopulationDef::new("Grandchild").with_parent("Child").with_positive(["Y"]),
        ];
        let thresholds: ThresholdTable =
            [("CD3".to_string(), cd3), ("Y".to_string(), 0.0)].into_iter().collect();

        let out = resolve_populations(&events, &defs, &thresholds).unwrap();
        for pop in out.populations.iter() {
            let parent = match pop.parent.as_deref() {
                Some(p) => out.populations.get(p).unwrap(),
                None => &events,
            };
            prop_assert!(pop.table.len() <= parent.len());
            prop_assert!(pop.table.row_ids().iter().all(|id| parent.row_ids().contains(id)));
            prop_assert!(pop.table.shares_storage_with(&events));
        }
    }

    #[test]
    fn prop_threshold_estimate_is_deterministic(
        values in prop::collection::vec(arb_coord(), 1..256),
    ) {
        let estimator = ThresholdEstimator::default();
        let first = estimator.estimate(&values);
        prop_assert!(first.is_some());
        prop_assert_eq!(first, estimator.estimate(&values));
    }
}
