//! Build flow composition modes.

use serde::{Deserialize, Serialize};

/// Which of the three possible workflows a build flow instantiates.
///
/// A closed set of role combinations; the flow-construction code matches
/// exhaustively over these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFlowMode {
    /// No workflows; a constructed but inert flow.
    None,
    /// Read documents into a raw-doc consumer.
    Reader,
    /// Read documents through the processing stage.
    ReaderAndProcessor,
    /// Build an index from already-processed documents.
    Builder,
    /// Process and build: the realtime ingestion configuration.
    ProcessorAndBuilder,
    /// Read straight into the builder, bypassing processing.
    ReaderAndBuilder,
    /// Read, process and build in one composed pipeline.
    All,
}

impl BuildFlowMode {
    /// Whether this mode includes the reader role.
    pub fn has_reader(&self) -> bool {
        matches!(
            self,
            BuildFlowMode::Reader
                | BuildFlowMode::ReaderAndProcessor
                | BuildFlowMode::ReaderAndBuilder
                | BuildFlowMode::All
        )
    }

    /// Whether this mode includes the processor role.
    pub fn has_processor(&self) -> bool {
        matches!(
            self,
            BuildFlowMode::ReaderAndProcessor | BuildFlowMode::ProcessorAndBuilder | BuildFlowMode::All
        )
    }

    /// Whether this mode includes the builder role.
    pub fn has_builder(&self) -> bool {
        matches!(
            self,
            BuildFlowMode::Builder
                | BuildFlowMode::ProcessorAndBuilder
                | BuildFlowMode::ReaderAndBuilder
                | BuildFlowMode::All
        )
    }

    /// Whether a read-to-processor workflow is created.
    pub fn builds_read_to_processor(&self) -> bool {
        self.has_reader() && !self.builds_read_to_build()
    }

    /// Whether a processor-to-build workflow is created.
    pub fn builds_processor_to_build(&self) -> bool {
        self.has_builder() && !self.builds_read_to_build()
    }

    /// Whether the direct read-to-build workflow is created.
    ///
    /// Only the Reader+Builder combination without a processor pumps raw
    /// documents straight into the builder.
    pub fn builds_read_to_build(&self) -> bool {
        matches!(self, BuildFlowMode::ReaderAndBuilder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_membership() {
        assert!(BuildFlowMode::Reader.has_reader());
        assert!(!BuildFlowMode::Reader.has_processor());
        assert!(!BuildFlowMode::Reader.has_builder());

        assert!(BuildFlowMode::All.has_reader());
        assert!(BuildFlowMode::All.has_processor());
        assert!(BuildFlowMode::All.has_builder());

        assert!(!BuildFlowMode::None.has_reader());
        assert!(!BuildFlowMode::None.has_processor());
        assert!(!BuildFlowMode::None.has_builder());
    }

    #[test]
    fn test_flow_selection_reader_only() {
        let mode = BuildFlowMode::Reader;
        assert!(mode.builds_read_to_processor());
        assert!(!mode.builds_processor_to_build());
        assert!(!mode.builds_read_to_build());
    }

    #[test]
    fn test_flow_selection_all() {
        let mode = BuildFlowMode::All;
        assert!(mode.builds_read_to_processor());
        assert!(mode.builds_processor_to_build());
        assert!(!mode.builds_read_to_build());
    }

    #[test]
    fn test_flow_selection_processor_and_builder() {
        let mode = BuildFlowMode::ProcessorAndBuilder;
        assert!(!mode.builds_read_to_processor());
        assert!(mode.builds_processor_to_build());
        assert!(!mode.builds_read_to_build());
    }

    #[test]
    fn test_flow_selection_reader_and_builder_is_direct() {
        let mode = BuildFlowMode::ReaderAndBuilder;
        assert!(!mode.builds_read_to_processor());
        assert!(!mode.builds_processor_to_build());
        assert!(mode.builds_read_to_build());
    }

    #[test]
    fn test_flow_selection_none() {
        let mode = BuildFlowMode::None;
        assert!(!mode.builds_read_to_processor());
        assert!(!mode.builds_processor_to_build());
        assert!(!mode.builds_read_to_build());
    }
}
