//! Session scenarios for the simulation harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Every client joins at once and sends one-part reports
    Lockstep,

    /// The last client connects after several barrier re-broadcasts
    LateJoiner,

    /// Clients split each report into a random number of parts
    MultiPart,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Lockstep,
            ScenarioId::LateJoiner,
            ScenarioId::MultiPart,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Lockstep => "lockstep",
            ScenarioId::LateJoiner => "late_joiner",
            ScenarioId::MultiPart => "multi_part",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Lockstep => "All clients join together, single-part reports every step",
            ScenarioId::LateJoiner => "Last client misses the first sync requests and joins on a re-broadcast",
            ScenarioId::MultiPart => "Reports split into 1-4 parts, completion detected by the zero count",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lockstep" => Ok(ScenarioId::Lockstep),
            "late_joiner" | "latejoiner" | "late" => Ok(ScenarioId::LateJoiner),
            "multi_part" | "multipart" => Ok(ScenarioId::MultiPart),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("MultiPart".parse::<ScenarioId>(), Ok(ScenarioId::MultiPart));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
