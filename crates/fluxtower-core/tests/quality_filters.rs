mod common;

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use fluxtower_core::quality_filters::{
    apply_filters, default_chain, FilterCriterion, FilterDefaults, FilterError,
};

use common::{series_frame, timestamps, values};

#[test]
fn flux_bound_is_exclusive_at_both_ends() -> anyhow::Result<()> {
    let df = series_frame(
        &[
            "2023-06-01 00:00",
            "2023-06-01 00:30",
            "2023-06-01 01:00",
            "2023-06-01 01:30",
            "2023-06-01 02:00",
        ],
        &[(
            "co2_flux",
            vec![Some(-600.0), Some(-499.0), Some(0.0), Some(49_999.0), Some(50_000.0)],
        )],
    );
    let defaults = FilterDefaults::default();

    let filtered = apply_filters(
        &df,
        &[FilterCriterion::flux_bound("co2_flux", defaults.flux_min, defaults.flux_max)],
    )?;

    assert_eq!(
        values(&filtered, "co2_flux"),
        vec![Some(-499.0), Some(0.0), Some(49_999.0)]
    );
    Ok(())
}

#[test]
fn chain_equals_intersection_of_criteria() -> anyhow::Result<()> {
    let df = series_frame(
        &[
            "2023-06-01 00:00",
            "2023-06-01 00:30",
            "2023-06-01 01:00",
            "2023-06-01 01:30",
            "2023-06-01 02:00",
        ],
        &[
            ("qc_co2_flux", vec![Some(0.0), Some(1.0), Some(0.0), Some(0.0), Some(0.0)]),
            ("u*", vec![Some(0.5), Some(0.5), Some(0.1), Some(0.3), Some(0.4)]),
            ("co2_flux", vec![Some(1.0), Some(1.0), Some(1.0), Some(2.0), Some(900.0)]),
            ("H", vec![Some(10.0), Some(10.0), Some(10.0), Some(20.0), Some(10.0)]),
            ("LE", vec![Some(5.0), Some(5.0), Some(5.0), None, Some(5.0)]),
        ],
    );
    let defaults = FilterDefaults {
        flux_max: 500.0,
        ..FilterDefaults::default()
    };
    let chain = default_chain(&defaults);

    let combined = apply_filters(&df, &chain)?;

    let mut expected: BTreeSet<NaiveDateTime> = timestamps(&df).into_iter().collect();
    for criterion in &chain {
        let alone = apply_filters(&df, std::slice::from_ref(criterion))?;
        let kept: BTreeSet<NaiveDateTime> = timestamps(&alone).into_iter().collect();
        expected = expected.intersection(&kept).copied().collect();
    }

    assert_eq!(timestamps(&combined), expected.into_iter().collect::<Vec<_>>());
    assert_eq!(values(&combined, "co2_flux"), vec![Some(1.0)]);
    Ok(())
}

#[test]
fn default_chain_order() {
    let chain = default_chain(&FilterDefaults::default());
    let columns: Vec<&str> = chain.iter().map(FilterCriterion::column).collect();
    assert_eq!(columns, vec!["qc_co2_flux", "u*", "co2_flux", "H", "LE"]);
}

#[test]
fn missing_values_never_pass() {
    let values = [None, Some(0.5)];
    assert_eq!(
        FilterCriterion::frictional_velocity("u*", 0.3).mask(&values),
        vec![false, true]
    );
    assert_eq!(
        FilterCriterion::quality_flag("qc_H", 0.0).mask(&[None, Some(0.0)]),
        vec![false, true]
    );
}

#[test]
fn wind_direction_uses_mean_of_full_input() -> anyhow::Result<()> {
    let df = series_frame(
        &["2023-06-01 00:00", "2023-06-01 00:30", "2023-06-01 01:00", "2023-06-01 01:30"],
        &[("wind_dir", vec![Some(170.0), Some(180.0), Some(190.0), None])],
    );

    let filtered = apply_filters(&df, &[FilterCriterion::wind_direction(5.0)])?;

    assert_eq!(values(&filtered, "wind_dir"), vec![Some(180.0)]);
    Ok(())
}

#[test]
fn absent_column_is_reported() {
    let df = series_frame(&["2023-06-01 00:00"], &[("H", vec![Some(1.0)])]);
    let err = apply_filters(&df, &[FilterCriterion::frictional_velocity("u*", 0.3)]).unwrap_err();
    assert!(matches!(err, FilterError::MissingColumn { ref column, .. } if column == "u*"));
}

#[test]
fn criteria_deserialize_from_tagged_config() -> anyhow::Result<()> {
    let criterion: FilterCriterion =
        serde_json::from_str(r#"{"kind":"between","column":"h2o_flux","min":-500,"max":50000}"#)?;
    assert_eq!(criterion, FilterCriterion::flux_bound("h2o_flux", -500.0, 50_000.0));
    Ok(())
}
