//! Typed data ports connecting a component to the rest of the framework.
//!
//! * [`InputPort`] keeps only the latest written value (a data connection, not
//!   a queue).  Each read reports whether that value is new since the last
//!   read, was already seen, or was never written at all.
//! * [`OutputPort`] broadcasts every written sample to all subscribers and
//!   remembers the last one.  Writing with nobody listening is not an error.
//!
//! Both are built on Tokio's `watch` and `broadcast` channels so a writer or
//! reader may live on another thread.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

/// Capacity of each output port's broadcast buffer.
const OUTPUT_CAPACITY: usize = 64;

/// Freshness of the value returned by an input port read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Nothing has ever been written to the port.
    NoData,
    /// The value was already returned by a previous read.
    OldData,
    /// The value was written since the previous read.
    NewData,
}

/// Result of [`InputPort::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sample<T> {
    NoData,
    Old(T),
    New(T),
}

impl<T> Sample<T> {
    /// The [`FlowStatus`] this sample corresponds to.
    pub fn status(&self) -> FlowStatus {
        match self {
            Sample::NoData => FlowStatus::NoData,
            Sample::Old(_) => FlowStatus::OldData,
            Sample::New(_) => FlowStatus::NewData,
        }
    }

    /// The carried value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Sample::NoData => None,
            Sample::Old(v) | Sample::New(v) => Some(v),
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Latest-value input port.
pub struct InputPort<T> {
    name: String,
    doc: String,
    tx: Arc<watch::Sender<Option<T>>>,
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> InputPort<T> {
    /// Create an unconnected port.  Reads return [`Sample::NoData`] until a
    /// [`PortWriter`] obtained from [`InputPort::writer`] writes a value.
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            name: name.into(),
            doc: doc.into(),
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// A handle the framework side uses to feed this port.
    pub fn writer(&self) -> PortWriter<T> {
        PortWriter {
            port: self.name.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Read the latest value and mark it as seen.
    pub fn read(&mut self) -> Sample<T> {
        let fresh = self.rx.has_changed().unwrap_or(false);
        let current = self.rx.borrow_and_update();
        match current.as_ref() {
            None => Sample::NoData,
            Some(v) if fresh => Sample::New(v.clone()),
            Some(v) => Sample::Old(v.clone()),
        }
    }
}

/// Write end of an [`InputPort`].  Cheap to clone and `Send` when `T` is.
pub struct PortWriter<T> {
    port: String,
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for PortWriter<T> {
    fn clone(&self) -> Self {
        Self {
            port: self.port.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T> PortWriter<T> {
    /// Name of the port this writer feeds.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Replace the port's value; the next read reports [`FlowStatus::NewData`].
    pub fn write(&self, value: T) {
        self.tx.send_replace(Some(value));
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Broadcasting output port.
pub struct OutputPort<T> {
    name: String,
    doc: String,
    tx: broadcast::Sender<T>,
    last: Option<T>,
}

impl<T: Clone> OutputPort<T> {
    /// Create a port whose subscribers start with nothing buffered.
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(OUTPUT_CAPACITY);
        Self {
            name: name.into(),
            doc: doc.into(),
            tx,
            last: None,
        }
    }

    /// Set the sample reported by [`OutputPort::last`] before the first write.
    pub fn with_data_sample(mut self, sample: T) -> Self {
        self.last = Some(sample);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Publish `value`.  Returns how many subscribers were handed the sample
    /// (`0` when nobody is listening).
    pub fn write(&mut self, value: T) -> usize {
        self.last = Some(value.clone());
        self.tx.send(value).unwrap_or(0)
    }

    /// Most recently written sample (or the data sample).
    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Receive every sample written from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }
}
