use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("bone '{bone}' references out-of-range {field} index {index}")]
    InvalidBoneIndex {
        bone: String,
        field: &'static str,
        index: usize,
    },

    #[error("duplicate bone name '{name}'")]
    DuplicateBoneName { name: String },

    #[error("unknown bone '{name}' referenced by morph '{morph}'")]
    UnknownMorphBone { morph: String, name: String },

    #[error("worker panicked: {message}")]
    WorkerPanicked { message: String },

    #[cfg(feature = "json")]
    #[error("failed to parse JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "json")]
    #[error("failed to write JSON: {message}")]
    JsonWrite { message: String },

    #[cfg(feature = "json")]
    #[error("unknown parent bone '{parent}' for bone '{bone}'")]
    JsonUnknownBoneParent { bone: String, parent: String },

    #[cfg(feature = "json")]
    #[error("unknown bone '{name}' referenced by {context}")]
    JsonUnknownBone { context: String, name: String },

    #[cfg(feature = "json")]
    #[error("unknown sizing feature '{name}'")]
    JsonUnknownFeature { name: String },
}
