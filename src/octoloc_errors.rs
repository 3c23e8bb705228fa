use thiserror::Error;

#[derive(Error, Debug)]
pub enum OctolocError {
    #[error("Pick references a stream absent from the station catalog: {0}")]
    UnknownStation(String),

    #[error("Too few usable stations to constrain a hypocenter: {0}")]
    DegenerateGeometry(String),

    #[error("Octree search exhausted its budget of {evaluations} evaluations without converging")]
    SearchNonConvergence { evaluations: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid time string: {0}")]
    InvalidTime(String),

    #[error("Invalid velocity model specification: {0}")]
    InvalidVelocityModel(String),

    #[error("Unsupported phase hint: {0}")]
    InvalidPhase(String),

    #[error("Invalid stream identifier: {0}")]
    InvalidStreamId(String),

    #[error("Error while parsing the stream whitelist: {0}")]
    WhitelistParsing(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl PartialEq for OctolocError {
    fn eq(&self, other: &Self) -> bool {
        use OctolocError::*;
        match (self, other) {
            (UnknownStation(a), UnknownStation(b)) => a == b,
            (DegenerateGeometry(a), DegenerateGeometry(b)) => a == b,
            (
                SearchNonConvergence { evaluations: a },
                SearchNonConvergence { evaluations: b },
            ) => a == b,
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (InvalidTime(a), InvalidTime(b)) => a == b,
            (InvalidVelocityModel(a), InvalidVelocityModel(b)) => a == b,
            (InvalidPhase(a), InvalidPhase(b)) => a == b,
            (InvalidStreamId(a), InvalidStreamId(b)) => a == b,
            (WhitelistParsing(a), WhitelistParsing(b)) => a == b,

            // Wrapped foreign errors: equal if same variant
            (InvalidPattern(_), InvalidPattern(_)) => true,
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            _ => false,
        }
    }
}
