use std::fmt;
use std::marker::PhantomData;

/// Identifies an event within its [`Events`] channel, in send order.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EventId<T> {
    pub id: usize,
    _marker: PhantomData<T>,
}

impl<T> Copy for EventId<T> {}
impl<T> Clone for EventId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> fmt::Debug for EventId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event<{}>#{}",
            std::any::type_name::<T>().split("::").last().unwrap(),
            self.id
        )
    }
}

#[derive(Debug)]
struct EventInstance<T> {
    event_id: EventId<T>,
    event: T,
}

#[derive(Debug, Clone, Copy)]
enum BufferState {
    A,
    B,
}

/// A double-buffered event channel.
///
/// Each call to [`update`](Events::update) (once per schedule pass, via
/// [`Events::update_system`] in `First`) swaps buffers and clears the older
/// one. Readers that poll at least once per update never miss events; an
/// event is dropped after at most two updates.
#[derive(Debug)]
pub struct Events<T> {
    events_a: Vec<EventInstance<T>>,
    events_b: Vec<EventInstance<T>>,
    a_start_event_count: usize,
    b_start_event_count: usize,
    event_count: usize,
    state: BufferState,
}

impl<T: Send + Sync + 'static> crate::component::Resource for Events<T> {}

impl<T> Default for Events<T> {
    fn default() -> Self {
        Self {
            events_a: Vec::new(),
            events_b: Vec::new(),
            a_start_event_count: 0,
            b_start_event_count: 0,
            event_count: 0,
            state: BufferState::A,
        }
    }
}

impl<T: Send + Sync + 'static> Events<T> {
    /// Appends an event to the current buffer.
    pub fn send(&mut self, event: T) {
        let event_id = EventId {
            id: self.event_count,
            _marker: PhantomData,
        };
        let instance = EventInstance { event_id, event };
        match self.state {
            BufferState::A => self.events_a.push(instance),
            BufferState::B => self.events_b.push(instance),
        }
        self.event_count += 1;
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = T>) {
        for event in events {
            self.send(event);
        }
    }

    /// A reader that will see all events currently buffered.
    pub fn get_reader(&self) -> ManualEventReader<T> {
        ManualEventReader::default()
    }

    /// A reader that ignores everything already buffered.
    pub fn get_reader_current(&self) -> ManualEventReader<T> {
        ManualEventReader {
            last_event_count: self.event_count,
            _marker: PhantomData,
        }
    }

    /// A system that rotates the buffers once per schedule pass. Installed
    /// into the first schedule of the frame when an event type is
    /// registered.
    pub fn update_system(mut events: crate::change_detection::ResMut<Self>) {
        events.update();
    }

    /// Swaps buffers and clears the older one. Call once per schedule pass.
    pub fn update(&mut self) {
        match self.state {
            BufferState::A => {
                self.events_b = Vec::new();
                self.state = BufferState::B;
                self.b_start_event_count = self.event_count;
            }
            BufferState::B => {
                self.events_a = Vec::new();
                self.state = BufferState::A;
                self.a_start_event_count = self.event_count;
            }
        }
    }

    pub fn clear(&mut self) {
        self.events_a.clear();
        self.events_b.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events_a.is_empty() && self.events_b.is_empty()
    }

    /// Removes all buffered events, yielding them in send order.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        let map = |instance: EventInstance<T>| instance.event;
        match self.state {
            BufferState::A => self
                .events_b
                .drain(..)
                .map(map)
                .chain(self.events_a.drain(..).map(map)),
            BufferState::B => self
                .events_a
                .drain(..)
                .map(map)
                .chain(self.events_b.drain(..).map(map)),
        }
    }

    fn iter_from<'a>(
        &'a self,
        last_event_count: usize,
    ) -> impl DoubleEndedIterator<Item = (&'a T, EventId<T>)> {
        let a_index = last_event_count.saturating_sub(self.a_start_event_count);
        let b_index = last_event_count.saturating_sub(self.b_start_event_count);
        let (older, older_index, newer, newer_index) = match self.state {
            BufferState::A => (&self.events_b, b_index, &self.events_a, a_index),
            BufferState::B => (&self.events_a, a_index, &self.events_b, b_index),
        };
        older
            .get(older_index..)
            .unwrap_or(&[])
            .iter()
            .chain(newer.get(newer_index..).unwrap_or(&[]))
            .map(|instance| (&instance.event, instance.event_id))
    }
}

/// A cursor over an [`Events`] channel. Each reader independently tracks the
/// count of events it has consumed.
#[derive(Debug)]
pub struct ManualEventReader<T> {
    last_event_count: usize,
    _marker: PhantomData<T>,
}

impl<T> Default for ManualEventReader<T> {
    fn default() -> Self {
        Self {
            last_event_count: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> ManualEventReader<T> {
    /// Yields unread events in send order across both buffers, advancing the
    /// cursor.
    pub fn read<'a>(&mut self, events: &'a Events<T>) -> impl DoubleEndedIterator<Item = &'a T> {
        self.read_with_id(events).map(|(event, _)| event)
    }

    pub fn read_with_id<'a>(
        &mut self,
        events: &'a Events<T>,
    ) -> impl DoubleEndedIterator<Item = (&'a T, EventId<T>)> {
        let iter = events.iter_from(self.last_event_count);
        self.last_event_count = events.event_count;
        iter
    }

    /// How many events are waiting, without consuming them.
    pub fn len(&self, events: &Events<T>) -> usize {
        events.event_count.saturating_sub(self.last_event_count)
    }

    pub fn is_empty(&self, events: &Events<T>) -> bool {
        self.len(events) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    struct TestEvent(usize);

    fn collect(events: &Events<TestEvent>, reader: &mut ManualEventReader<TestEvent>) -> Vec<TestEvent> {
        reader.read(events).copied().collect()
    }

    #[test]
    fn double_buffer_window() {
        let mut events = Events::<TestEvent>::default();
        let mut prompt_reader = events.get_reader();
        let mut missed_reader = events.get_reader();

        events.send(TestEvent(0));
        assert_eq!(collect(&events, &mut prompt_reader), vec![TestEvent(0)]);
        assert_eq!(collect(&events, &mut prompt_reader), vec![]);

        events.update();
        // One update later the event is still visible to a late reader.
        let mut late_reader = events.get_reader();
        assert_eq!(collect(&events, &mut late_reader), vec![TestEvent(0)]);

        events.update();
        // Two updates later it is gone for fresh readers, and the reader
        // that never polled has missed it.
        let mut fresh_reader = events.get_reader();
        assert_eq!(collect(&events, &mut fresh_reader), vec![]);
        assert_eq!(collect(&events, &mut missed_reader), vec![]);
    }

    #[test]
    fn readers_see_writer_order_across_buffers() {
        let mut events = Events::<TestEvent>::default();
        let mut reader = events.get_reader();
        events.send(TestEvent(1));
        events.send(TestEvent(2));
        events.update();
        events.send(TestEvent(3));
        assert_eq!(
            collect(&events, &mut reader),
            vec![TestEvent(1), TestEvent(2), TestEvent(3)]
        );
    }

    #[test]
    fn reader_current_skips_history() {
        let mut events = Events::<TestEvent>::default();
        events.send(TestEvent(1));
        let mut reader = events.get_reader_current();
        events.send(TestEvent(2));
        assert_eq!(collect(&events, &mut reader), vec![TestEvent(2)]);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut events = Events::<TestEvent>::default();
        events.send(TestEvent(1));
        events.update();
        events.send(TestEvent(2));
        let drained: Vec<_> = events.drain().collect();
        assert_eq!(drained, vec![TestEvent(1), TestEvent(2)]);
        assert!(events.is_empty());
    }
}
