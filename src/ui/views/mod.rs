mod issue_detail;
mod labels;
mod manage_milestones;
mod milestones;
mod sort;

pub use issue_detail::IssueDetailView;
pub use labels::LabelsView;
pub use manage_milestones::ManageMilestonesView;
pub use milestones::MilestonesView;
pub use sort::SortView;
