use crate::{INFERTILITY_FIELD, MISCARRIAGES_FIELD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CovariateError {
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("invalid value {value:?} for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovariateField {
    Infertility,
    PriorMiscarriages,
}

impl CovariateField {
    pub fn form_name(&self) -> &'static str {
        match self {
            CovariateField::Infertility => INFERTILITY_FIELD,
            CovariateField::PriorMiscarriages => MISCARRIAGES_FIELD,
        }
    }

    pub fn from_form_name(name: &str) -> Option<Self> {
        match name {
            INFERTILITY_FIELD => Some(CovariateField::Infertility),
            MISCARRIAGES_FIELD => Some(CovariateField::PriorMiscarriages),
            _ => None,
        }
    }
}

/// Clinical inputs submitted next to the scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Covariates {
    pub infertility: bool,
    pub prior_miscarriages: u32,
}

impl Covariates {
    pub fn new(infertility: bool, prior_miscarriages: u32) -> Self {
        Self {
            infertility,
            prior_miscarriages,
        }
    }

    /// Form encoding of the infertility flag, `"0"` or `"1"`.
    pub fn infertility_value(&self) -> &'static str {
        if self.infertility {
            "1"
        } else {
            "0"
        }
    }

    pub fn miscarriages_value(&self) -> String {
        self.prior_miscarriages.to_string()
    }

    pub fn parse_infertility(raw: &str) -> Result<bool, CovariateError> {
        match raw.trim().to_lowercase().as_str() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            _ => Err(CovariateError::Invalid {
                field: INFERTILITY_FIELD,
                value: raw.to_string(),
                reason: "expected \"0\" or \"1\"",
            }),
        }
    }

    pub fn parse_miscarriages(raw: &str) -> Result<u32, CovariateError> {
        raw.trim()
            .parse::<u32>()
            .map_err(|_| CovariateError::Invalid {
                field: MISCARRIAGES_FIELD,
                value: raw.to_string(),
                reason: "expected a non-negative integer",
            })
    }

    /// Builds covariates from raw form values, failing on absent fields.
    pub fn from_form(inf: Option<&str>, misc: Option<&str>) -> Result<Self, CovariateError> {
        let inf = inf.ok_or(CovariateError::Missing(INFERTILITY_FIELD))?;
        let misc = misc.ok_or(CovariateError::Missing(MISCARRIAGES_FIELD))?;

        Ok(Self {
            infertility: Self::parse_infertility(inf)?,
            prior_miscarriages: Self::parse_miscarriages(misc)?,
        })
    }
}
