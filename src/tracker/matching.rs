//! Matching utilities for multi-object tracking.

use ndarray::Array2;
use tracing::warn;

use crate::tracker::config::MatcherConfig;
use crate::tracker::distance::TrackObjectDistance;
use crate::tracker::object::TrackedDetection;
use crate::tracker::track::Track;

/// Costs that differ by less than this are treated as ties.
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// `(track index, detection index)` pairs, sorted by track index.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Rows and columns of one connected block of gated track/detection pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub tracks: Vec<usize>,
    pub detections: Vec<usize>,
}

/// Hungarian matcher with a global distance gate.
#[derive(Debug, Clone)]
pub struct HungarianMatcher {
    match_distance_maximum: f64,
    distance: TrackObjectDistance,
}

impl HungarianMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            match_distance_maximum: config.match_distance_maximum,
            distance: TrackObjectDistance::new(config.weights),
        }
    }

    pub fn match_distance_maximum(&self) -> f64 {
        self.match_distance_maximum
    }

    /// `tracks x detections` distance matrix, using each track's prediction.
    pub fn association_matrix(
        &self,
        tracks: &[Track],
        detections: &[TrackedDetection],
        dt: f64,
    ) -> Array2<f64> {
        let mut costs = Array2::zeros((tracks.len(), detections.len()));
        for (i, track) in tracks.iter().enumerate() {
            let predicted = track.predicted_state();
            for (j, detection) in detections.iter().enumerate() {
                costs[[i, j]] = self.distance.compute(track, &predicted, detection, dt);
            }
        }
        costs
    }

    /// Solve the gated assignment one connected component at a time.
    pub fn assign(&self, costs: &Array2<f64>) -> AssignmentResult {
        let gate = self.match_distance_maximum;
        let (num_rows, num_cols) = costs.dim();
        let mut track_matched = vec![false; num_rows];
        let mut detection_matched = vec![false; num_cols];
        let mut matches = Vec::new();

        for component in connected_components(costs, gate) {
            if component.tracks.len() == 1 && component.detections.len() == 1 {
                matches.push((component.tracks[0], component.detections[0]));
            } else {
                let sub = Array2::from_shape_fn(
                    (component.tracks.len(), component.detections.len()),
                    |(i, j)| costs[[component.tracks[i], component.detections[j]]],
                );
                for (i, j) in linear_assignment(&sub, gate).matches {
                    matches.push((component.tracks[i], component.detections[j]));
                }
            }
        }

        for &(i, j) in &matches {
            track_matched[i] = true;
            detection_matched[j] = true;
        }
        matches.sort_unstable();

        AssignmentResult {
            matches,
            unmatched_tracks: unset_indices(&track_matched),
            unmatched_detections: unset_indices(&detection_matched),
        }
    }

    pub fn match_tracks(
        &self,
        tracks: &[Track],
        detections: &[TrackedDetection],
        dt: f64,
    ) -> (AssignmentResult, Array2<f64>) {
        let costs = self.association_matrix(tracks, detections, dt);
        (self.assign(&costs), costs)
    }
}

fn is_gated(cost: f64, gate: f64) -> bool {
    cost.is_finite() && cost <= gate
}

fn unset_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &set)| if set { None } else { Some(i) })
        .collect()
}

/// Split the bipartite graph of gated pairs into connected components.
///
/// Tracks or detections without any gated pair belong to no component.
/// Components are ordered by their lowest track index; indices inside a
/// component are sorted.
pub fn connected_components(costs: &Array2<f64>, gate: f64) -> Vec<Component> {
    let (num_rows, num_cols) = costs.dim();
    let mut row_visited = vec![false; num_rows];
    let mut col_visited = vec![false; num_cols];
    let mut components = Vec::new();

    for start in 0..num_rows {
        if row_visited[start] || !(0..num_cols).any(|j| is_gated(costs[[start, j]], gate)) {
            continue;
        }
        let mut tracks = Vec::new();
        let mut detections = Vec::new();
        let mut row_stack = vec![start];
        row_visited[start] = true;

        while let Some(i) = row_stack.pop() {
            tracks.push(i);
            for j in 0..num_cols {
                if col_visited[j] || !is_gated(costs[[i, j]], gate) {
                    continue;
                }
                col_visited[j] = true;
                detections.push(j);
                for k in 0..num_rows {
                    if !row_visited[k] && is_gated(costs[[k, j]], gate) {
                        row_visited[k] = true;
                        row_stack.push(k);
                    }
                }
            }
        }

        tracks.sort_unstable();
        detections.sort_unstable();
        components.push(Component { tracks, detections });
    }
    components
}

/// Minimum-cost assignment in which entries above `thresh` can never be
/// selected.
///
/// The matrix is padded to a square with a cost larger than any feasible
/// total, so the solver first maximises the number of gated pairs and then
/// minimises their cost. Equal-cost alternatives resolve to the lowest
/// track, then the lowest detection.
pub fn linear_assignment(cost_matrix: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: vec![],
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    if num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: vec![],
        };
    }

    let mut row_to_col = solve_gated(cost_matrix, thresh);
    canonicalize_ties(cost_matrix, thresh, &mut row_to_col);

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask: Vec<bool> = vec![true; num_cols];
    for (row_idx, col) in row_to_col.iter().enumerate() {
        match col {
            Some(col_idx) => {
                matches.push((row_idx, *col_idx));
                unmatched_detections_mask[*col_idx] = false;
            }
            None => unmatched_tracks.push(row_idx),
        }
    }

    let unmatched_detections: Vec<usize> = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| if u { Some(i) } else { None })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// One optimal gated assignment as a row-to-column map, straight from lapjv.
fn solve_gated(cost_matrix: &Array2<f64>, thresh: f64) -> Vec<Option<usize>> {
    let (num_rows, num_cols) = cost_matrix.dim();
    let mut row_to_col: Vec<Option<usize>> = vec![None; num_rows];
    if num_rows == 0 || num_cols == 0 {
        return row_to_col;
    }

    let size = num_rows.max(num_cols);
    if size == 1 {
        if is_gated(cost_matrix[[0, 0]], thresh) {
            row_to_col[0] = Some(0);
        }
        return row_to_col;
    }

    let infeasible = thresh.abs().max(1.0) * (size as f64 + 1.0) * 10.0;
    let mut padded = Array2::<f64>::from_elem((size, size), infeasible);
    for i in 0..num_rows {
        for j in 0..num_cols {
            let cost = cost_matrix[[i, j]];
            if is_gated(cost, thresh) {
                padded[[i, j]] = cost;
            }
        }
    }

    match lapjv::lapjv(&padded) {
        Ok((rows, _)) => {
            for (row_idx, &col_idx) in rows.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && is_gated(cost_matrix[[row_idx, col_idx]], thresh) {
                    row_to_col[row_idx] = Some(col_idx);
                }
            }
        }
        Err(err) => {
            warn!(?err, rows = num_rows, cols = num_cols, "assignment solver failed");
        }
    }
    row_to_col
}

/// Number of matches and their total cost.
fn assignment_total(costs: &Array2<f64>, row_to_col: &[Option<usize>]) -> (usize, f64) {
    row_to_col
        .iter()
        .enumerate()
        .filter_map(|(i, col)| col.map(|j| costs[[i, j]]))
        .fold((0, 0.0), |(count, total), cost| (count + 1, total + cost))
}

/// Rewrite an optimal assignment so that equal-cost alternatives prefer the
/// lowest track index, then the lowest detection index.
///
/// Rows are fixed in order, each to the lowest column (matched before
/// unmatched) for which the remaining rows and columns can still reach the
/// optimal match count and cost. Left unchanged if no row admits such a
/// choice within the tie tolerance.
fn canonicalize_ties(costs: &Array2<f64>, gate: f64, row_to_col: &mut [Option<usize>]) {
    let (num_rows, num_cols) = costs.dim();
    let same = |a: f64, b: f64| (a - b).abs() <= TIE_EPSILON * a.abs().max(b.abs()).max(1.0);
    let (target_count, target_cost) = assignment_total(costs, row_to_col);

    let mut canonical = Vec::with_capacity(num_rows);
    let mut used = vec![false; num_cols];
    let mut prefix_count = 0;
    let mut prefix_cost = 0.0;

    for i in 0..num_rows {
        let candidates = (0..num_cols)
            .filter(|&j| !used[j] && is_gated(costs[[i, j]], gate))
            .map(Some)
            .chain(std::iter::once(None));

        let mut chosen = None;
        for candidate in candidates {
            let (count, cost) = match candidate {
                Some(j) => (prefix_count + 1, prefix_cost + costs[[i, j]]),
                None => (prefix_count, prefix_cost),
            };
            let rest_rows: Vec<usize> = (i + 1..num_rows).collect();
            let rest_cols: Vec<usize> = (0..num_cols)
                .filter(|&c| !used[c] && Some(c) != candidate)
                .collect();
            let rest = Array2::from_shape_fn((rest_rows.len(), rest_cols.len()), |(r, c)| {
                costs[[rest_rows[r], rest_cols[c]]]
            });
            let (rest_count, rest_cost) = assignment_total(&rest, &solve_gated(&rest, gate));
            if count + rest_count == target_count && same(cost + rest_cost, target_cost) {
                chosen = Some(candidate);
                break;
            }
        }

        let Some(choice) = chosen else {
            return;
        };
        if let Some(j) = choice {
            used[j] = true;
            prefix_count += 1;
            prefix_cost += costs[[i, j]];
        }
        canonical.push(choice);
    }

    row_to_col.copy_from_slice(&canonical);
}
