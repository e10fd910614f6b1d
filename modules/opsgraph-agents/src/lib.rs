pub mod extractor;
pub mod ingestor;
pub mod planner;
pub mod testing;

pub use extractor::{
    build_extraction_prompt, parse_extraction, ExtractedEntity, ExtractedRelationship,
    Extraction, TextExtractor,
};
pub use ingestor::{IngestError, IngestOptions, IngestReport, Ingestor, ItemError, ItemKind};
pub use planner::analysis::Analysis;
pub use planner::{Planner, PlannerAnswer, QuestionContext, Routine};
