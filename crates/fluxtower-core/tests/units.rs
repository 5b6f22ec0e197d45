mod common;

use fluxtower_core::units::{convert_units, UnitConversions, VERTICAL_WIND_SD_COLUMN};
use fluxtower_core::PipelineError;

use common::{assert_close, series_frame, values};

fn observations() -> polars::prelude::DataFrame {
    series_frame(
        &["2023-06-01 00:00", "2023-06-01 00:30"],
        &[
            ("co2_flux", vec![Some(0.01), None]),
            ("h2o_flux", vec![Some(0.002), Some(0.001)]),
            ("h2o_molar_density", vec![Some(610.0), Some(611.0)]),
            ("air_temperature", vec![Some(290.15), Some(273.15)]),
            ("v_var", vec![Some(0.25), Some(-0.01)]),
        ],
    )
}

#[test]
fn converts_to_reporting_units() -> anyhow::Result<()> {
    let converted = convert_units(&observations(), &UnitConversions::default())?;

    let co2 = values(&converted, "co2_flux");
    assert_close(co2[0], 0.038);
    assert_eq!(co2[1], None);
    assert_close(values(&converted, "h2o_flux")[0], 3.1104);
    assert_close(values(&converted, "h2o_molar_density")[1], 611_000.0);

    let celsius = values(&converted, "air_temperature");
    assert_close(celsius[0], 17.0);
    assert_close(celsius[1], 0.0);

    let v_sd = values(&converted, VERTICAL_WIND_SD_COLUMN);
    assert_close(v_sd[0], 0.5);
    assert_eq!(v_sd[1], None);
    Ok(())
}

#[test]
fn missing_required_column_is_validation_error() {
    let df = observations().drop("v_var").expect("drop column");
    let err = convert_units(&df, &UnitConversions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::DataValidation(ref message) if message.contains("v_var")));
}
