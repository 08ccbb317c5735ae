//! Per-thread filter progress records and the completion estimate shown while polling.
//!
//! Records are written only by the thread that owns them and read by any poller. Reads are
//! relaxed: a snapshot may mix values from adjacent rows, which is fine for display.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Live position of one filter thread.
#[derive(Debug, Default)]
pub struct ThreadProgress {
    active: AtomicBool,
    level: AtomicUsize,
    face: AtomicUsize,
    row: AtomicUsize,
    start_face: AtomicUsize,
    end_face: AtomicUsize,
}

/// Point-in-time copy of a [`ThreadProgress`]. `end_face` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub active: bool,
    pub level: usize,
    pub face: usize,
    pub row: usize,
    pub start_face: usize,
    pub end_face: usize,
}

impl ThreadProgress {
    /// Marks the thread active on `level`, owning faces `start_face..end_face`.
    pub fn begin_level(&self, level: usize, start_face: usize, end_face: usize) {
        self.level.store(level, Ordering::Relaxed);
        self.start_face.store(start_face, Ordering::Relaxed);
        self.end_face.store(end_face, Ordering::Relaxed);
        self.face.store(start_face, Ordering::Relaxed);
        self.row.store(0, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    pub fn set_face(&self, face: usize) {
        self.face.store(face, Ordering::Relaxed);
        self.row.store(0, Ordering::Relaxed);
    }

    pub fn set_row(&self, row: usize) {
        self.row.store(row, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            active: self.active.load(Ordering::Acquire),
            level: self.level.load(Ordering::Relaxed),
            face: self.face.load(Ordering::Relaxed),
            row: self.row.load(Ordering::Relaxed),
            start_face: self.start_face.load(Ordering::Relaxed),
            end_face: self.end_face.load(Ordering::Relaxed),
        }
    }
}

/// Relative cost model of a filter pass. Each level costs roughly
/// `(source size * filter angle)^2 * destination size^2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressModel {
    pub input_size: usize,
    pub output_size: usize,
    pub mip_levels: usize,
    pub base_angle: f32,
    pub initial_mip_angle: f32,
    pub angle_scale: f32,
}

impl Default for ProgressModel {
    fn default() -> Self {
        Self { input_size: 1, output_size: 1, mip_levels: 1, base_angle: 0.0, initial_mip_angle: 1.0, angle_scale: 1.0 }
    }
}

impl ProgressModel {
    /// Estimated fraction of the whole pass completed at `snapshot`, in `[0, 1]`.
    pub fn fraction_completed(&self, snapshot: &ProgressSnapshot) -> f32 {
        let base_angle = if self.base_angle > 0.0 { self.base_angle } else { 0.01 };
        let out = self.output_size as f32;
        let mut total = (self.input_size as f32 * base_angle).powi(2) * out * out;
        let mut completed = if snapshot.level > 0 { total } else { 0.0 };
        let mut current = if snapshot.level == 0 { total } else { 0.0 };
        let mut current_size = self.output_size;

        let mut angle = self.initial_mip_angle;
        let mut dst_size = self.output_size;
        for level in 1..self.mip_levels {
            dst_size /= 2;
            angle = (angle * self.angle_scale).min(180.0);
            let dst = dst_size as f32;
            let cost = (dst * 2.0 * angle).powi(2) * dst * dst;
            total += cost;
            if snapshot.level > level {
                completed = total;
            }
            if snapshot.level == level {
                current = cost;
                current_size = dst_size;
            }
        }
        if total <= 0.0 {
            return 0.0;
        }

        let current = current / total;
        let completed = completed / total;
        let faces = snapshot.end_face.saturating_sub(snapshot.start_face).max(1) as f32;
        let faces_done = snapshot.face.saturating_sub(snapshot.start_face) as f32;
        let face_cost = current / faces;
        let row_fraction = snapshot.row as f32 / current_size.max(1) as f32;
        (completed + face_cost * faces_done + face_cost * row_fraction).clamp(0.0, 1.0)
    }

    /// One thread's status line: its completion estimate and position, or `Ready` when idle.
    pub fn thread_status(&self, snapshot: &ProgressSnapshot) -> String {
        if !snapshot.active {
            return "Ready".to_string();
        }
        format!(
            "{:5.2}% Complete (Level {:3}, Face {:3}, Row {:3})",
            100.0 * self.fraction_completed(snapshot),
            snapshot.level,
            snapshot.face,
            snapshot.row
        )
    }

    /// Status of every filter thread. Two-thread passes list both threads; otherwise only
    /// thread 0 is shown.
    pub fn status_string(&self, records: &[ThreadProgress], num_threads: usize) -> String {
        let status = |index: usize| {
            records.get(index).map(|record| self.thread_status(&record.snapshot())).unwrap_or_default()
        };
        if num_threads == 2 {
            format!("Thread0: {} \nThread1: {}", status(0), status(1))
        } else {
            format!("Thread 0: {} ", status(0))
        }
    }
}
