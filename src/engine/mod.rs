pub mod alert;
pub mod goal_matrix;
pub mod merge;
pub mod movers;
pub mod normalize;
pub mod snapshot;
