/// Outcome of the most recent frame for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Created from an unmatched detection this frame
    #[default]
    New,
    /// Matched to a detection this frame
    Tracked,
    /// No detection this frame, state carried by prediction
    Lost,
}
