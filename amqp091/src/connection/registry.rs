//! Channel id allocation

use std::{
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use crate::endpoint::ChannelEndpoint;

use super::AllocChannelError;

/// Maps channel ids to the endpoints registered on a connection
///
/// Ids are handed out by a cursor that only moves forward and wraps at the
/// 16-bit boundary, skipping 0. A released id is therefore not handed out
/// again until the cursor has gone all the way around.
pub(crate) struct ChannelRegistry {
    cursor: u16,
    channel_max: u16,
    channels: BTreeMap<u16, Weak<dyn ChannelEndpoint>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self {
            cursor: 1,
            channel_max: 0,
            channels: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("cursor", &self.cursor)
            .field("channel_max", &self.channel_max)
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ChannelRegistry {
    /// Limit on the number of registered channels, 0 meaning no limit
    pub(crate) fn channel_max(&self) -> u16 {
        self.channel_max
    }

    pub(crate) fn set_channel_max(&mut self, channel_max: u16) {
        self.channel_max = channel_max;
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }

    pub(crate) fn register(
        &mut self,
        channel: Weak<dyn ChannelEndpoint>,
    ) -> Result<u16, AllocChannelError> {
        if self.channel_max > 0 && self.channels.len() >= self.channel_max as usize {
            return Err(AllocChannelError::ChannelMaxReached);
        }
        // every id in 1..=u16::MAX is taken
        if self.channels.len() >= u16::MAX as usize {
            return Err(AllocChannelError::ChannelMaxReached);
        }

        loop {
            let id = self.cursor;
            self.cursor = self.cursor.wrapping_add(1);
            if id != 0 && !self.channels.contains_key(&id) {
                self.channels.insert(id, channel);
                return Ok(id);
            }
        }
    }

    pub(crate) fn unregister(&mut self, id: u16) -> Option<Weak<dyn ChannelEndpoint>> {
        match id {
            0 => None,
            id => self.channels.remove(&id),
        }
    }

    /// Unregisters `channel` if it is the endpoint stored under its id
    pub(crate) fn release(&mut self, channel: &dyn ChannelEndpoint) -> bool {
        let id = channel.id();
        let registered = self
            .channels
            .get(&id)
            .is_some_and(|stored| same_endpoint(stored, channel));
        if registered {
            self.unregister(id);
        }
        registered
    }

    /// Removes the highest ids until no more than `channel_max` channels are
    /// registered, returning them highest first
    pub(crate) fn evict_over_limit(&mut self) -> Vec<(u16, Weak<dyn ChannelEndpoint>)> {
        let mut evicted = Vec::new();
        while self.channel_max > 0 && self.channels.len() > self.channel_max as usize {
            match self.channels.pop_last() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    pub(crate) fn get(&self, id: u16) -> Option<Rc<dyn ChannelEndpoint>> {
        self.channels.get(&id).and_then(Weak::upgrade)
    }

    /// Live endpoints in ascending id order
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn ChannelEndpoint>> {
        self.channels.values().filter_map(Weak::upgrade).collect()
    }

    /// Removes every entry, returning the endpoints that are still alive
    pub(crate) fn clear(&mut self) -> Vec<Rc<dyn ChannelEndpoint>> {
        let channels = std::mem::take(&mut self.channels);
        channels.values().filter_map(Weak::upgrade).collect()
    }
}

fn same_endpoint(stored: &Weak<dyn ChannelEndpoint>, channel: &dyn ChannelEndpoint) -> bool {
    std::ptr::eq(
        stored.as_ptr() as *const (),
        channel as *const dyn ChannelEndpoint as *const (),
    )
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        collections::HashSet,
        rc::{Rc, Weak},
    };

    use amqp091_types::Frame;
    use proptest::prelude::*;

    use super::ChannelRegistry;
    use crate::{
        connection::{AllocChannelError, Connection, Error},
        endpoint::ChannelEndpoint,
    };

    struct Dummy;

    impl ChannelEndpoint for Dummy {
        fn id(&self) -> u16 {
            0
        }

        fn on_frame(&self, _connection: &Connection, _frame: Frame) -> Result<(), Error> {
            Ok(())
        }

        fn close(&self) {}

        fn invalidate(&self) {}

        fn reject(&self, _connection: &Connection, _reason: &str) {}
    }

    fn endpoint(owner: &Rc<Dummy>) -> Weak<dyn ChannelEndpoint> {
        let weak: Weak<Dummy> = Rc::downgrade(owner);
        weak
    }

    /// Endpoint that remembers the id it was given
    #[derive(Default)]
    struct Fixed(Cell<u16>);

    impl ChannelEndpoint for Fixed {
        fn id(&self) -> u16 {
            self.0.get()
        }

        fn on_frame(&self, _connection: &Connection, _frame: Frame) -> Result<(), Error> {
            Ok(())
        }

        fn close(&self) {}

        fn invalidate(&self) {}

        fn reject(&self, _connection: &Connection, _reason: &str) {}
    }

    fn register_fixed(registry: &mut ChannelRegistry) -> Rc<Fixed> {
        let owner = Rc::new(Fixed::default());
        let weak: Weak<Fixed> = Rc::downgrade(&owner);
        let id = registry.register(weak).unwrap();
        owner.0.set(id);
        owner
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        let ids: Vec<u16> = (0..3)
            .map(|_| registry.register(endpoint(&owner)).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn channel_max_limits_concurrent_channels() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        registry.set_channel_max(2);

        let first = registry.register(endpoint(&owner)).unwrap();
        registry.register(endpoint(&owner)).unwrap();
        assert_eq!(
            registry.register(endpoint(&owner)),
            Err(AllocChannelError::ChannelMaxReached)
        );

        registry.unregister(first);
        assert_eq!(registry.register(endpoint(&owner)), Ok(3));
    }

    #[test]
    fn released_id_is_not_reused_immediately() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        let id = registry.register(endpoint(&owner)).unwrap();
        registry.unregister(id);
        let next = registry.register(endpoint(&owner)).unwrap();
        assert_ne!(id, next);
    }

    #[test]
    fn cursor_wraps_past_zero_and_skips_used_ids() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        assert_eq!(registry.register(endpoint(&owner)), Ok(1));

        registry.cursor = u16::MAX;
        assert_eq!(registry.register(endpoint(&owner)), Ok(u16::MAX));
        // 0 is skipped, 1 is still in use
        assert_eq!(registry.register(endpoint(&owner)), Ok(2));
    }

    #[test]
    fn released_id_comes_back_after_full_revolution() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        let id = registry.register(endpoint(&owner)).unwrap();
        registry.unregister(id);

        registry.cursor = u16::MAX;
        registry.register(endpoint(&owner)).unwrap();
        assert_eq!(registry.register(endpoint(&owner)), Ok(id));
    }

    #[test]
    fn unregistering_zero_is_a_no_op() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        registry.register(endpoint(&owner)).unwrap();
        assert!(registry.unregister(0).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dropped_endpoints_are_not_returned() {
        let owner = Rc::new(Dummy);
        let gone = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        let kept = registry.register(endpoint(&owner)).unwrap();
        let dropped = registry.register(endpoint(&gone)).unwrap();
        drop(gone);

        assert!(registry.get(kept).is_some());
        assert!(registry.get(dropped).is_none());
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.clear().len(), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn release_requires_the_registered_endpoint() {
        let mut registry = ChannelRegistry::default();
        let channel = register_fixed(&mut registry);

        // same id, different endpoint
        let impostor = Fixed(Cell::new(channel.id()));
        assert!(!registry.release(&impostor));
        assert!(registry.get(channel.id()).is_some());

        assert!(registry.release(&*channel));
        assert_eq!(registry.len(), 0);
        assert!(!registry.release(&*channel));
    }

    #[test]
    fn stale_endpoint_cannot_release_a_reused_id() {
        let mut registry = ChannelRegistry::default();
        let stale = register_fixed(&mut registry);
        let id = stale.id();
        registry.unregister(id);

        registry.cursor = id;
        let current = register_fixed(&mut registry);
        assert_eq!(current.id(), id);

        assert!(!registry.release(&*stale));
        assert!(registry.get(id).is_some());
    }

    #[test]
    fn lowering_channel_max_evicts_highest_ids() {
        let owner = Rc::new(Dummy);
        let mut registry = ChannelRegistry::default();
        for _ in 0..4 {
            registry.register(endpoint(&owner)).unwrap();
        }

        registry.set_channel_max(2);
        let evicted: Vec<u16> = registry
            .evict_over_limit()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(evicted, vec![4, 3]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(1).is_some());
        assert!(registry.evict_over_limit().is_empty());

        registry.set_channel_max(0);
        registry.register(endpoint(&owner)).unwrap();
        assert!(registry.evict_over_limit().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register,
        Unregister(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Register),
            1 => any::<usize>().prop_map(Op::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn registered_ids_stay_unique_and_nonzero(
            channel_max in 0u16..8,
            ops in proptest::collection::vec(op(), 1..64),
        ) {
            let owner = Rc::new(Dummy);
            let mut registry = ChannelRegistry::default();
            registry.set_channel_max(channel_max);
            let mut live: Vec<u16> = Vec::new();

            for op in ops {
                match op {
                    Op::Register => match registry.register(endpoint(&owner)) {
                        Ok(id) => live.push(id),
                        Err(_) => {
                            prop_assert!(channel_max > 0 && live.len() >= channel_max as usize);
                        }
                    },
                    Op::Unregister(index) if !live.is_empty() => {
                        let id = live.swap_remove(index % live.len());
                        prop_assert!(registry.unregister(id).is_some());
                    }
                    Op::Unregister(_) => {}
                }

                let unique: HashSet<u16> = live.iter().copied().collect();
                prop_assert_eq!(unique.len(), live.len());
                prop_assert!(!unique.contains(&0));
                prop_assert_eq!(registry.len(), live.len());
                if channel_max > 0 {
                    prop_assert!(live.len() <= channel_max as usize);
                }
            }
        }
    }
}
