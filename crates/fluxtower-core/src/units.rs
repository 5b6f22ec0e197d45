use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame;

/// mmol m-2 s-1 -> g m-2 d-1
pub const CO2_FLUX_CONVERSION_FACTOR: f64 = 3.8;
/// mmol m-2 s-1 -> g m-2 d-1
pub const H2O_FLUX_CONVERSION_FACTOR: f64 = 1555.2;
/// mmol m-3 -> umol m-3
pub const H2O_MOLAR_DENSITY_CONVERSION_FACTOR: f64 = 1000.0;
/// K -> degC
pub const KELVIN_CONVERSION_OFFSET: f64 = 273.15;

pub const VERTICAL_WIND_VARIANCE_COLUMN: &str = "v_var";
pub const VERTICAL_WIND_SD_COLUMN: &str = "v_sd";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    "co2_flux",
    "h2o_flux",
    "h2o_molar_density",
    "air_temperature",
    VERTICAL_WIND_VARIANCE_COLUMN,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConversions {
    pub co2_flux_factor: f64,
    pub h2o_flux_factor: f64,
    pub h2o_molar_density_factor: f64,
    pub kelvin_offset: f64,
}

impl Default for UnitConversions {
    fn default() -> Self {
        Self {
            co2_flux_factor: CO2_FLUX_CONVERSION_FACTOR,
            h2o_flux_factor: H2O_FLUX_CONVERSION_FACTOR,
            h2o_molar_density_factor: H2O_MOLAR_DENSITY_CONVERSION_FACTOR,
            kelvin_offset: KELVIN_CONVERSION_OFFSET,
        }
    }
}

/// Rescales fluxes and densities, shifts air temperature to Celsius and derives `v_sd` from
/// the vertical wind variance. Negative variances yield a missing `v_sd`.
pub fn convert_units(df: &DataFrame, conversions: &UnitConversions) -> Result<DataFrame> {
    frame::require_columns(df, &REQUIRED_COLUMNS, "unit conversion")?;

    let mut output = df.clone();

    let scaled = [
        ("co2_flux", conversions.co2_flux_factor),
        ("h2o_flux", conversions.h2o_flux_factor),
        ("h2o_molar_density", conversions.h2o_molar_density_factor),
    ];
    for (name, factor) in scaled {
        let values: Vec<Option<f64>> = frame::f64_values(df, name)?
            .into_iter()
            .map(|v| v.map(|x| x * factor))
            .collect();
        output.with_column(Series::new(name.into(), values))?;
    }

    let celsius: Vec<Option<f64>> = frame::f64_values(df, "air_temperature")?
        .into_iter()
        .map(|v| v.map(|kelvin| kelvin - conversions.kelvin_offset))
        .collect();
    output.with_column(Series::new("air_temperature".into(), celsius))?;

    let sd: Vec<Option<f64>> = frame::f64_values(df, VERTICAL_WIND_VARIANCE_COLUMN)?
        .into_iter()
        .map(|v| v.filter(|variance| *variance >= 0.0).map(f64::sqrt))
        .collect();
    output.with_column(Series::new(VERTICAL_WIND_SD_COLUMN.into(), sd))?;

    Ok(output)
}
