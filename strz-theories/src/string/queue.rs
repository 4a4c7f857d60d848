//! Worklists whose contents follow the host's decision levels.

/// A FIFO worklist that can be rolled back to the state of an earlier scope.
///
/// Items are never removed physically while their scope is alive; consuming
/// an item only advances `head`. Popping a scope restores both the length and
/// the head recorded when the scope was pushed.
#[derive(Debug, Clone)]
pub(crate) struct ScopedQueue<T> {
    items: Vec<T>,
    head: usize,
    marks: Vec<(usize, usize)>,
}

impl<T: Clone> ScopedQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            head: 0,
            marks: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Consume every pending item.
    pub(crate) fn take_pending(&mut self) -> Vec<T> {
        let pending = self.items[self.head..].to_vec();
        self.head = self.items.len();
        pending
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> &[T] {
        &self.items[self.head..]
    }

    pub(crate) fn num_pending(&self) -> usize {
        self.items.len().saturating_sub(self.head)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head >= self.items.len()
    }

    pub(crate) fn push_scope(&mut self) {
        self.marks.push((self.items.len(), self.head));
    }

    pub(crate) fn pop_scope(&mut self, num_scopes: usize) {
        if num_scopes == 0 {
            return;
        }
        let keep = self.marks.len().saturating_sub(num_scopes);
        if let Some(&(len, head)) = self.marks.get(keep) {
            self.items.truncate(len);
            self.head = head;
        }
        self.marks.truncate(keep);
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
        self.marks.clear();
    }
}

impl<T: Clone> Default for ScopedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_consumption() {
        let mut q = ScopedQueue::new();
        q.push(1);
        q.push(2);
        assert_eq!(q.pending(), &[1, 2]);
        assert_eq!(q.num_pending(), 2);
        assert_eq!(q.take_pending(), vec![1, 2]);
        assert_eq!(q.num_pending(), 0);
        assert!(q.is_empty());
        q.push(3);
        assert_eq!(q.take_pending(), vec![3]);
    }

    #[test]
    fn test_pop_restores_items_and_head() {
        let mut q = ScopedQueue::new();
        q.push(1);
        q.push(2);
        q.push_scope();
        q.take_pending();
        q.push(3);
        assert!(!q.is_empty());

        q.pop_scope(1);
        assert_eq!(q.pending(), &[1, 2]);
    }

    #[test]
    fn test_pop_multiple_scopes() {
        let mut q = ScopedQueue::new();
        q.push('a');
        q.push_scope();
        q.push('b');
        q.push_scope();
        q.push('c');
        q.pop_scope(2);
        assert_eq!(q.pending(), &['a']);

        // Popping more scopes than exist is a no-op on the contents.
        q.pop_scope(3);
        assert_eq!(q.pending(), &['a']);
    }
}
