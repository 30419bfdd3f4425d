use std::fmt::{Display, Formatter};

pub type CalResult<T> = Result<T, CalibrationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationErrorCategory {
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl CalibrationErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "input-validation",
            Self::IoSystemError => "io-system",
            Self::ComputationError => "computation",
            Self::InternalError => "internal",
        }
    }
}

/// Categorized run error carrying a stable diagnostic code, e.g.
/// `INPUT.SPECIES_ALIGNMENT` or `IO.CURVE_WRITE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationError {
    category: CalibrationErrorCategory,
    code: String,
    message: String,
}

impl CalibrationError {
    pub fn input_validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: CalibrationErrorCategory::InputValidationError,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn io_system(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: CalibrationErrorCategory::IoSystemError,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn computation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: CalibrationErrorCategory::ComputationError,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: CalibrationErrorCategory::InternalError,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> CalibrationErrorCategory {
        self.category
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!(
            "ERROR: [{}] ({}) {}",
            self.code,
            self.category.as_str(),
            self.message
        )
    }
}

impl Display for CalibrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CalibrationError {}
