//! Tracks and multi-track containers.
//!
//! A [`Track`] is a named, ordered sequence of [`NoteElement`]s. A
//! [`TrackData`] bundles up to [`MAX_TRACK_COUNT`] tracks of one
//! datatype and provides the two iteration orders every consumer relies
//! on: the *all-track* order (ascending measure, ties by ascending track
//! index, then insertion order) and the *row* order (one pseudo-row per
//! distinct measure).

use super::note::{ChainStatus, NoteElement};

/// Upper bound of tracks per [`TrackData`].
pub const MAX_TRACK_COUNT: usize = 128;

/// Discriminator for the payload variant a track stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackDatatype {
    /// Playable notes.
    Note,
    /// Autoplayed keysounds.
    Bgm,
    /// Background animations.
    Bga,
    /// Timing objects.
    Tempo,
    /// Command events.
    Event,
}

/// A named, ordered sequence of note elements.
///
/// Elements are kept sorted by `measure`. When the track is duplicable,
/// equal positions keep insertion order; otherwise an insert at an
/// occupied position replaces the resident element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    name: String,
    datatype: TrackDatatype,
    duplicable: bool,
    elements: Vec<NoteElement>,
}

impl Track {
    /// Creates an empty track of the given datatype.
    #[must_use]
    pub const fn new(datatype: TrackDatatype) -> Self {
        Self {
            name: String::new(),
            datatype,
            duplicable: false,
            elements: Vec::new(),
        }
    }

    /// The track name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the track.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The datatype tag.
    #[must_use]
    pub const fn datatype(&self) -> TrackDatatype {
        self.datatype
    }

    /// Whether elements may share one position.
    #[must_use]
    pub const fn duplicable(&self) -> bool {
        self.duplicable
    }

    /// Enables or disables position duplication.
    pub const fn set_duplicable(&mut self, duplicable: bool) {
        self.duplicable = duplicable;
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the track holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Inserts `element`, keeping measure order. Replaces a resident
    /// element at the same position unless the track is duplicable.
    pub fn push(&mut self, element: NoteElement) {
        let measure = element.measure();
        let insert_at = self
            .elements
            .partition_point(|e| e.measure() <= measure);
        if !self.duplicable
            && insert_at > 0
            && self.elements[insert_at - 1].measure() == measure
        {
            self.elements[insert_at - 1] = element;
            return;
        }
        self.elements.insert(insert_at, element);
    }

    /// Iterates elements in measure order.
    pub fn iter(&self) -> std::slice::Iter<'_, NoteElement> {
        self.elements.iter()
    }

    /// Iterates elements mutably in measure order. Positions must not be
    /// modified through this.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, NoteElement> {
        self.elements.iter_mut()
    }

    /// Elements with `begin <= measure < end`.
    pub fn range(&self, begin: f64, end: f64) -> &[NoteElement] {
        let lo = self.elements.partition_point(|e| e.measure() < begin);
        let hi = self.elements.partition_point(|e| e.measure() < end);
        &self.elements[lo..hi]
    }

    /// The element exactly at `measure`, if any.
    #[must_use]
    pub fn get_at(&self, measure: f64) -> Option<&NoteElement> {
        let idx = self.elements.partition_point(|e| e.measure() < measure);
        self.elements.get(idx).filter(|e| e.measure() == measure)
    }

    /// The last element strictly before `measure`.
    #[must_use]
    pub fn last_before(&self, measure: f64) -> Option<&NoteElement> {
        let idx = self.elements.partition_point(|e| e.measure() < measure);
        idx.checked_sub(1).and_then(|i| self.elements.get(i))
    }

    /// Mutable variant of [`Track::last_before`].
    pub fn last_before_mut(&mut self, measure: f64) -> Option<&mut NoteElement> {
        let idx = self.elements.partition_point(|e| e.measure() < measure);
        idx.checked_sub(1).and_then(|i| self.elements.get_mut(i))
    }

    /// The last element of the track.
    #[must_use]
    pub fn last(&self) -> Option<&NoteElement> {
        self.elements.last()
    }

    /// Mutable access to the last element.
    pub fn last_mut(&mut self) -> Option<&mut NoteElement> {
        self.elements.last_mut()
    }

    /// Removes the element exactly at `measure`.
    pub fn remove_at(&mut self, measure: f64) -> Option<NoteElement> {
        let idx = self.elements.partition_point(|e| e.measure() < measure);
        if self.elements.get(idx)?.measure() == measure {
            Some(self.elements.remove(idx))
        } else {
            None
        }
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Removes elements with `begin <= measure < end`.
    pub fn clear_range(&mut self, begin: f64, end: f64) {
        let lo = self.elements.partition_point(|e| e.measure() < begin);
        let hi = self.elements.partition_point(|e| e.measure() < end);
        self.elements.drain(lo..hi);
    }

    /// Copies the `begin..end` range of `from` into this track at the same
    /// positions.
    pub fn copy_range(&mut self, from: &Track, begin: f64, end: f64) {
        for e in from.range(begin, end) {
            self.push(e.clone());
        }
    }

    /// Shifts elements in `begin..end` by `delta` measures.
    pub fn move_range(&mut self, delta: f64, begin: f64, end: f64) {
        let lo = self.elements.partition_point(|e| e.measure() < begin);
        let hi = self.elements.partition_point(|e| e.measure() < end);
        let mut moved: Vec<NoteElement> = self.elements.drain(lo..hi).collect();
        for e in &mut moved {
            let m = e.measure() + delta;
            e.set_measure(m.max(0.0));
        }
        for e in moved {
            self.push(e);
        }
    }

    /// Shifts every element at or after `begin` forward by `length`
    /// measures, opening a blank range.
    pub fn insert_blank(&mut self, begin: f64, length: f64) {
        let lo = self.elements.partition_point(|e| e.measure() < begin);
        for e in &mut self.elements[lo..] {
            let m = e.measure() + length;
            e.set_measure(m);
        }
    }

    /// Whether a longnote chain spans the position `measure`.
    #[must_use]
    pub fn has_hold_at(&self, measure: f64) -> bool {
        let mut open: Option<f64> = None;
        for e in &self.elements {
            match e.chain() {
                ChainStatus::Start => open = Some(e.measure()),
                ChainStatus::End => {
                    if let Some(start) = open.take()
                        && start <= measure
                        && measure <= e.measure()
                    {
                        return true;
                    }
                }
                ChainStatus::Tap | ChainStatus::Body => {}
            }
        }
        // An unterminated chain holds to the end of the track.
        open.is_some_and(|start| start <= measure)
    }

    /// Whether the track contains any longnote head.
    #[must_use]
    pub fn has_longnote(&self) -> bool {
        self.elements
            .iter()
            .any(|e| e.chain() == ChainStatus::Start)
    }
}

/// Up to [`MAX_TRACK_COUNT`] tracks of one datatype.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackData {
    datatype: TrackDatatype,
    tracks: Vec<Track>,
}

impl TrackData {
    /// Creates a container with `track_count` empty tracks.
    #[must_use]
    pub fn new(datatype: TrackDatatype, track_count: usize) -> Self {
        let track_count = track_count.min(MAX_TRACK_COUNT);
        Self {
            datatype,
            tracks: (0..track_count).map(|_| Track::new(datatype)).collect(),
        }
    }

    /// The datatype tag shared by all tracks.
    #[must_use]
    pub const fn datatype(&self) -> TrackDatatype {
        self.datatype
    }

    /// Current number of tracks.
    #[must_use]
    pub const fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Grows or shrinks to `track_count` tracks, capped at
    /// [`MAX_TRACK_COUNT`].
    pub fn set_track_count(&mut self, track_count: usize) {
        let track_count = track_count.min(MAX_TRACK_COUNT);
        let datatype = self.datatype;
        self.tracks
            .resize_with(track_count, || Track::new(datatype));
    }

    /// The track at `index`, if present.
    #[must_use]
    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Mutable access to the track at `index`, if present.
    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    /// Iterates over the tracks.
    pub fn tracks(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    /// Mutable iteration over the tracks.
    pub fn tracks_mut(&mut self) -> std::slice::IterMut<'_, Track> {
        self.tracks.iter_mut()
    }

    /// Enables or disables position duplication on every track.
    pub fn set_duplicable(&mut self, duplicable: bool) {
        for t in &mut self.tracks {
            t.set_duplicable(duplicable);
        }
    }

    /// Inserts `element` into track `index`, growing the container when
    /// the index is beyond the current count (but below the cap).
    pub fn push_to(&mut self, index: usize, element: NoteElement) {
        if index >= MAX_TRACK_COUNT {
            return;
        }
        if index >= self.tracks.len() {
            self.set_track_count(index + 1);
        }
        self.tracks[index].push(element);
    }

    /// Total number of elements across tracks.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    /// Whether no track holds an element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(Track::is_empty)
    }

    /// Removes every element from every track.
    pub fn clear(&mut self) {
        for t in &mut self.tracks {
            t.clear();
        }
    }

    /// Removes elements with `begin <= measure < end` on every track.
    pub fn clear_range(&mut self, begin: f64, end: f64) {
        for t in &mut self.tracks {
            t.clear_range(begin, end);
        }
    }

    /// Copies a measure range from another container, track by track.
    pub fn copy_range(&mut self, from: &TrackData, begin: f64, end: f64) {
        for (idx, src) in from.tracks.iter().enumerate() {
            if src.is_empty() {
                continue;
            }
            if idx >= self.tracks.len() {
                self.set_track_count(idx + 1);
            }
            self.tracks[idx].copy_range(src, begin, end);
        }
    }

    /// Shifts a measure range by `delta` on every track.
    pub fn move_range(&mut self, delta: f64, begin: f64, end: f64) {
        for t in &mut self.tracks {
            t.move_range(delta, begin, end);
        }
    }

    /// Opens a blank range on every track.
    pub fn insert_blank(&mut self, begin: f64, length: f64) {
        for t in &mut self.tracks {
            t.insert_blank(begin, length);
        }
    }

    /// Whether any track holds a longnote spanning `measure`.
    #[must_use]
    pub fn has_hold_at(&self, measure: f64) -> bool {
        self.tracks.iter().any(|t| t.has_hold_at(measure))
    }

    /// Whether any track contains a longnote.
    #[must_use]
    pub fn has_longnote(&self) -> bool {
        self.tracks.iter().any(Track::has_longnote)
    }

    /// Rearranges whole tracks: the track at index `i` moves to index
    /// `mapping[i]`. `mapping` must be a permutation; an entry beyond
    /// [`MAX_TRACK_COUNT`] leaves its track in place.
    pub fn remap_tracks(&mut self, mapping: &[usize]) {
        // Grow so every reachable target slot exists.
        let needed = (0..self.tracks.len())
            .map(|i| mapping.get(i).copied().unwrap_or(i) + 1)
            .max()
            .unwrap_or(0)
            .min(MAX_TRACK_COUNT);
        if needed > self.tracks.len() {
            self.set_track_count(needed);
        }
        let len = self.tracks.len();
        let mut rearranged: Vec<Track> =
            (0..len).map(|_| Track::new(self.datatype)).collect();
        for (i, track) in self.tracks.drain(..).enumerate() {
            let target = mapping.get(i).copied().unwrap_or(i);
            if target < len {
                rearranged[target] = track;
            } else {
                rearranged[i] = track;
            }
        }
        self.tracks = rearranged;
    }

    /// Takes every element out, in all-track order, leaving the tracks
    /// empty. Used by editors that reassign tracks per note.
    pub fn take_all(&mut self) -> Vec<(usize, NoteElement)> {
        let mut items: Vec<(usize, NoteElement)> = Vec::with_capacity(self.element_count());
        for (idx, t) in self.tracks.iter_mut().enumerate() {
            for e in t.elements.drain(..) {
                items.push((idx, e));
            }
        }
        // Stable by position; insertion order within one track survives,
        // ties across tracks resolve by ascending track index.
        items.sort_by(|a, b| a.1.cmp_measure(&b.1).then(a.0.cmp(&b.0)));
        items
    }

    /// Merged iteration over all tracks: ascending measure, ties by
    /// ascending track index, then insertion order.
    #[must_use]
    pub fn all_iter(&self) -> AllTrackIter<'_> {
        AllTrackIter {
            cursors: self
                .tracks
                .iter()
                .map(|t| t.elements.as_slice())
                .collect(),
            positions: vec![0; self.tracks.len()],
        }
    }

    /// Row iteration: one pseudo-row per distinct measure position.
    #[must_use]
    pub fn row_iter(&self) -> RowIter<'_> {
        RowIter {
            inner: self.all_iter().peekable(),
            track_count: self.tracks.len(),
        }
    }
}

/// Iterator merging all tracks by `(measure, track index)`.
#[derive(Debug, Clone)]
pub struct AllTrackIter<'a> {
    cursors: Vec<&'a [NoteElement]>,
    positions: Vec<usize>,
}

impl<'a> Iterator for AllTrackIter<'a> {
    type Item = (usize, &'a NoteElement);

    fn next(&mut self) -> Option<Self::Item> {
        let mut best: Option<(usize, &'a NoteElement)> = None;
        for (track, (slice, &pos)) in
            self.cursors.iter().zip(self.positions.iter()).enumerate()
        {
            let Some(candidate) = slice.get(pos) else {
                continue;
            };
            let better = match best {
                None => true,
                // Strictly-less keeps the lowest track index on ties.
                Some((_, current)) => {
                    candidate.measure().total_cmp(&current.measure()).is_lt()
                }
            };
            if better {
                best = Some((track, candidate));
            }
        }
        let (track, element) = best?;
        self.positions[track] += 1;
        Some((track, element))
    }
}

/// One row yielded by [`RowIter`].
#[derive(Debug, Clone)]
pub struct Row<'a> {
    /// The shared measure position of this row.
    pub measure: f64,
    /// Per-track slot; `None` where the track has no element here. When a
    /// duplicable track has several elements at the position, the slot
    /// holds the last one.
    pub slots: Vec<Option<&'a NoteElement>>,
}

/// Iterator yielding one [`Row`] per distinct measure position.
#[derive(Debug, Clone)]
pub struct RowIter<'a> {
    inner: std::iter::Peekable<AllTrackIter<'a>>,
    track_count: usize,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let &(_, first) = self.inner.peek()?;
        let measure = first.measure();
        let mut slots: Vec<Option<&'a NoteElement>> = vec![None; self.track_count];
        while let Some(&(track, e)) = self.inner.peek() {
            if e.measure() != measure {
                break;
            }
            slots[track] = Some(e);
            self.inner.next();
        }
        Some(Row { measure, slots })
    }
}
