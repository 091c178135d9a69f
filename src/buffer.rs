/// Notice spliced in at the cut point when a buffer overflows its cap.
pub const TRUNCATION_NOTICE: &str =
    "\n\n[Output truncated due to size limits. Oldest output has been discarded.]\n\n";

/// Append-only text accumulator capped at `max` bytes.
///
/// On overflow the oldest bytes are discarded and a single truncation notice
/// is prepended to what remains, so the most recent output always survives.
/// The pipe feeding this buffer has no backpressure; the cap is what bounds
/// per-session memory.
#[derive(Debug)]
pub struct OutputBuffer {
    data: String,
    max: usize,
}

impl OutputBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            data: String::new(),
            max,
        }
    }

    /// Concatenate `text`, discarding the oldest bytes if the cap is exceeded.
    ///
    /// The retained tail is `max - len(notice)` bytes, with the cut rounded up
    /// to the next char boundary. A previously spliced notice sits at the head
    /// of the data and is always consumed by the next cut, so the notice never
    /// appears more than once.
    pub fn append(&mut self, text: &str) {
        self.data.push_str(text);
        if self.data.len() <= self.max {
            return;
        }
        let keep = self.max.saturating_sub(TRUNCATION_NOTICE.len());
        let mut cut = self.data.len() - keep;
        while cut < self.data.len() && !self.data.is_char_boundary(cut) {
            cut += 1;
        }
        self.data.replace_range(..cut, TRUNCATION_NOTICE);
    }

    /// Return the current contents and reset to empty.
    pub fn drain(&mut self) -> String {
        std::mem::take(&mut self.data)
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-session output state shared between the runner's reader tasks and the
/// session manager: `pending` holds bytes not yet consumed by a read, `full`
/// the whole merged stream since spawn. Both are capped at the same limit, so
/// the full record stays bounded while the child is still running.
#[derive(Debug)]
pub struct SessionBuffer {
    pending: OutputBuffer,
    full: OutputBuffer,
}

impl SessionBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            pending: OutputBuffer::new(max),
            full: OutputBuffer::new(max),
        }
    }

    pub fn append(&mut self, text: &str) {
        self.pending.append(text);
        self.full.append(text);
    }

    /// Drain bytes that arrived since the last call.
    pub fn drain_new(&mut self) -> String {
        self.pending.drain()
    }

    /// The merged stdout+stderr stream since spawn, bounded by the cap.
    pub fn full_text(&self) -> &str {
        self.full.as_str()
    }
}
