use slotmap::{DenseSlotMap, Key};
use std::fmt;

/// Owning arena of `T` addressed by keys of type `K`.
///
/// Storage is dense: live objects sit contiguously and iterate in
/// insertion order. Removing an object moves the last one into its place.
pub struct Pool<K: Key, T> {
    slots: DenseSlotMap<K, T>,
}

impl<K: Key, T> Pool<K, T> {
    pub fn new() -> Self {
        Self {
            slots: DenseSlotMap::with_key(),
        }
    }

    /// Create a default-constructed object and hand ownership to the pool.
    pub fn create(&mut self) -> K
    where
        T: Default,
    {
        self.slots.insert(T::default())
    }

    /// Create an object from any value convertible into `T`.
    ///
    /// This is how specialised variants are stored: a `PbrMaterial` goes in
    /// through `From<PbrMaterial> for Material` and is stored as a material.
    pub fn create_with(&mut self, value: impl Into<T>) -> K {
        self.slots.insert(value.into())
    }

    /// Remove and return the object behind `key`.
    ///
    /// Unknown or already destroyed keys are ignored.
    pub fn destroy(&mut self, key: K) -> Option<T> {
        self.slots.remove(key)
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots.get_mut(key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.slots.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.slots.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.values()
    }

    /// Remove every object, returning them in iteration order.
    pub fn drain(&mut self) -> Vec<(K, T)> {
        self.slots.drain().collect()
    }
}

impl<K: Key, T> Default for Pool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, T: fmt::Debug> fmt::Debug for Pool<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.slots.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::new_key_type;

    new_key_type! { struct TestKey; }

    #[derive(Debug, Default, PartialEq)]
    struct Shape {
        sides: u32,
    }

    struct Triangle;

    impl From<Triangle> for Shape {
        fn from(_: Triangle) -> Self {
            Shape { sides: 3 }
        }
    }

    #[test]
    fn create_then_destroy() {
        let mut pool: Pool<TestKey, Shape> = Pool::new();
        let a = pool.create();
        assert!(pool.contains(a));
        assert_eq!(pool.len(), 1);

        let removed = pool.destroy(a);
        assert_eq!(removed, Some(Shape::default()));
        assert!(!pool.contains(a));
        assert!(pool.is_empty());
    }

    #[test]
    fn destroy_unknown_key_is_noop() {
        let mut pool: Pool<TestKey, Shape> = Pool::new();
        let a = pool.create();
        let b = pool.create();
        pool.destroy(a);

        assert!(pool.destroy(a).is_none());
        assert!(pool.destroy(TestKey::default()).is_none());
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(b));
    }

    #[test]
    fn stale_key_never_aliases_new_object() {
        let mut pool: Pool<TestKey, Shape> = Pool::new();
        let a = pool.create();
        pool.destroy(a);
        let b = pool.create_with(Shape { sides: 7 });

        assert_ne!(a, b);
        assert!(pool.get(a).is_none());
        assert_eq!(pool.get(b).map(|s| s.sides), Some(7));
    }

    #[test]
    fn specialised_creation() {
        let mut pool: Pool<TestKey, Shape> = Pool::new();
        let t = pool.create_with(Triangle);
        assert_eq!(pool.get(t).map(|s| s.sides), Some(3));
    }

    #[test]
    fn iteration_tracks_create_and_destroy() {
        let mut pool: Pool<TestKey, Shape> = Pool::new();
        let keys: Vec<TestKey> = (0..5)
            .map(|i| pool.create_with(Shape { sides: i }))
            .collect();

        let order: Vec<u32> = pool.values().map(|s| s.sides).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        pool.destroy(keys[1]);
        pool.destroy(keys[3]);

        let live: Vec<TestKey> = pool.keys().collect();
        assert_eq!(live.len(), 3);
        for (i, key) in keys.iter().enumerate() {
            let expected = i != 1 && i != 3;
            assert_eq!(live.contains(key), expected);
        }
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut pool: Pool<TestKey, Shape> = Pool::new();
        let a = pool.create();
        if let Some(shape) = pool.get_mut(a) {
            shape.sides = 4;
        }
        assert_eq!(pool.get(a).map(|s| s.sides), Some(4));
    }
}
