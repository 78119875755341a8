pub mod preprocessed_frame;
