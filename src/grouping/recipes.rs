//! The fixed recipe catalogue.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::factors::{ADDITIVE, CATALYST, SUBSTRATE, TEMPERATURE};

/// One factor of a recipe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFactor {
    pub name: &'static str,
    /// Binned factors are compared by bin label, never flagged as missing.
    pub binned: bool,
}

const fn plain(name: &'static str) -> KeyFactor {
    KeyFactor {
        name,
        binned: false,
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Recipe {
    ByCatalyst,
    ByCatalystAdditive,
    BySubstrateCatalyst,
    ByTemperatureBin,
    AllInOne,
    OnePerExperiment,
}

impl Recipe {
    pub fn id(&self) -> &'static str {
        self.into()
    }

    pub fn description(&self) -> &'static str {
        match self {
            Recipe::ByCatalyst => "Group experiments that share a catalyst",
            Recipe::ByCatalystAdditive => "Group by catalyst and additive together",
            Recipe::BySubstrateCatalyst => "Group by substrate, then catalyst",
            Recipe::ByTemperatureBin => "Group by reaction temperature range",
            Recipe::AllInOne => "Put every experiment in a single group",
            Recipe::OnePerExperiment => "Give every experiment its own group",
        }
    }

    /// Factors that form the signature. Empty for the two structural recipes.
    pub fn key(&self) -> &'static [KeyFactor] {
        static BY_CATALYST: [KeyFactor; 1] = [plain(CATALYST)];
        static BY_CATALYST_ADDITIVE: [KeyFactor; 2] = [plain(CATALYST), plain(ADDITIVE)];
        static BY_SUBSTRATE_CATALYST: [KeyFactor; 2] = [plain(SUBSTRATE), plain(CATALYST)];
        static BY_TEMPERATURE_BIN: [KeyFactor; 1] = [KeyFactor {
            name: TEMPERATURE,
            binned: true,
        }];
        match self {
            Recipe::ByCatalyst => &BY_CATALYST,
            Recipe::ByCatalystAdditive => &BY_CATALYST_ADDITIVE,
            Recipe::BySubstrateCatalyst => &BY_SUBSTRATE_CATALYST,
            Recipe::ByTemperatureBin => &BY_TEMPERATURE_BIN,
            Recipe::AllInOne | Recipe::OnePerExperiment => &[],
        }
    }

    pub fn factors_used(&self) -> Vec<String> {
        self.key().iter().map(|k| k.name.to_string()).collect()
    }
}
