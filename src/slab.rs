//! Arena of entries, each linked into at most one circular doubly-linked
//! ring at a time.
//!
//! This is the C2 "clock list" mechanics shared by both replacement engine
//! variants: an entry's index (`Token`) is stable for as long as the entry
//! lives, `link`/`unlink` are O(1), and a ring's "head" reference is just
//! whichever token the owner last chose to remember as its hand/anchor —
//! new entries are spliced in as that head's predecessor, so they are the
//! *last* entry a hand sweeping forward via [`LinkedSlab::get`]'s returned
//! `next` token will reach. This is what gives freshly admitted or
//! freshly re-accessed entries a full sweep of protection before they can
//! be re-examined.

use std::mem;

/// Stable index into a [`LinkedSlab`]. Reused only after its entry has been
/// removed.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Token(usize);

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

enum Slot<T> {
    Occupied { value: T, prev: Token, next: Token },
    Vacant { next_free: Option<usize> },
}

pub struct LinkedSlab<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
}

impl<T> LinkedSlab<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
        }
    }

    /// Borrows the entry at `idx` along with the token of its successor in
    /// whatever ring it currently belongs to (itself, if unlinked/singleton).
    pub fn get(&self, idx: Token) -> Option<(&T, Token)> {
        match self.slots.get(idx.0)? {
            Slot::Occupied { value, next, .. } => Some((value, *next)),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get_mut(&mut self, idx: Token) -> Option<(&mut T, Token)> {
        match self.slots.get_mut(idx.0)? {
            Slot::Occupied { value, next, .. } => Some((value, *next)),
            Slot::Vacant { .. } => None,
        }
    }

    /// Inserts `value`, splicing it in immediately before `head` (so it is
    /// examined last by a hand that starts at `head` and walks forward), or
    /// as a singleton ring if `head` is `None`. The caller must update its
    /// own head/hand variable to `Some(result)` when it passed `None`.
    pub fn insert(&mut self, value: T, head: Option<Token>) -> Token {
        let idx = self.alloc();
        self.splice_before(idx, value, head);
        idx
    }

    fn alloc(&mut self) -> Token {
        if let Some(free) = self.free_head {
            let next_free = match &self.slots[free] {
                Slot::Vacant { next_free } => *next_free,
                Slot::Occupied { .. } => unreachable!("corrupt free list"),
            };
            self.free_head = next_free;
            Token(free)
        } else {
            self.slots.push(Slot::Vacant { next_free: None });
            Token(self.slots.len() - 1)
        }
    }

    fn splice_before(&mut self, idx: Token, value: T, head: Option<Token>) {
        match head {
            None => {
                self.slots[idx.0] = Slot::Occupied {
                    value,
                    prev: idx,
                    next: idx,
                };
            }
            Some(head) => {
                let tail = match &self.slots[head.0] {
                    Slot::Occupied { prev, .. } => *prev,
                    Slot::Vacant { .. } => panic!("head token does not belong to a ring"),
                };
                self.slots[idx.0] = Slot::Occupied {
                    value,
                    prev: tail,
                    next: head,
                };
                self.set_next(tail, idx);
                self.set_prev(head, idx);
            }
        }
    }

    /// Re-links a previously [`Self::unlink`]ed entry back into a ring,
    /// immediately before `head`.
    pub fn link(&mut self, idx: Token, head: Option<Token>) {
        let value = match mem::replace(&mut self.slots[idx.0], Slot::Vacant { next_free: None }) {
            Slot::Occupied { value, .. } => value,
            Slot::Vacant { .. } => panic!("cannot link a vacant slot"),
        };
        self.splice_before(idx, value, head);
    }

    /// Removes `idx` from its ring without deallocating it (it becomes a
    /// self-looped singleton, ready for [`Self::link`]). Returns the token
    /// that followed it, so a hand that was pointing at `idx` can advance.
    pub fn unlink(&mut self, idx: Token) -> Token {
        let (prev, next) = match &self.slots[idx.0] {
            Slot::Occupied { prev, next, .. } => (*prev, *next),
            Slot::Vacant { .. } => panic!("cannot unlink a vacant slot"),
        };
        if prev == idx {
            return idx;
        }
        self.set_next(prev, next);
        self.set_prev(next, prev);
        if let Slot::Occupied { prev, next, .. } = &mut self.slots[idx.0] {
            *prev = idx;
            *next = idx;
        }
        next
    }

    /// Removes `idx` entirely. Returns its value and the token that
    /// followed it (same convention as [`Self::unlink`]).
    pub fn remove(&mut self, idx: Token) -> Option<(T, Token)> {
        let next = self.unlink(idx);
        match mem::replace(
            &mut self.slots[idx.0],
            Slot::Vacant {
                next_free: self.free_head,
            },
        ) {
            Slot::Occupied { value, .. } => {
                self.free_head = Some(idx.0);
                Some((value, next))
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Splices `idx` (already occupied, not yet in a ring) in before `head`,
    /// updating `head` to `Some(idx)` if it was `None`. The C2 "link at
    /// head" primitive both replacement engines use for fresh inserts and
    /// promotions/demotions between rings.
    pub fn link_at(&mut self, idx: Token, head: &mut Option<Token>) {
        self.link(idx, *head);
        if head.is_none() {
            *head = Some(idx);
        }
    }

    /// Removes `idx` from its ring, advancing `head` to its successor if
    /// `head` was pointing at `idx`.
    pub fn unlink_at(&mut self, idx: Token, head: &mut Option<Token>) {
        let next = self.unlink(idx);
        if *head == Some(idx) {
            *head = if next == idx { None } else { Some(next) };
        }
    }

    /// Moves `idx` from the ring headed by `from` to the ring headed by
    /// `to` (e.g. a hot→cold demotion).
    pub fn relink_at(&mut self, idx: Token, from: &mut Option<Token>, to: &mut Option<Token>) {
        self.unlink_at(idx, from);
        self.link_at(idx, to);
    }

    /// Requeues the entry currently at `head` to the back of its own ring
    /// (maximal protection), advancing `head` to what follows it.
    /// Precondition: `*head == Some(idx)`.
    pub fn requeue_at(&mut self, idx: Token, head: &mut Option<Token>) {
        debug_assert_eq!(*head, Some(idx));
        let next = self.unlink(idx);
        if next == idx {
            // Singleton ring: idx is already the only (and so the head)
            // entry. Re-linking it to itself here would hand `link` a
            // `head` token whose slot it just vacated.
            *head = Some(idx);
            return;
        }
        *head = Some(next);
        self.link(idx, *head);
    }

    fn set_next(&mut self, idx: Token, next: Token) {
        if let Slot::Occupied { next: slot_next, .. } = &mut self.slots[idx.0] {
            *slot_next = next;
        }
    }

    fn set_prev(&mut self, idx: Token, prev: Token) {
        if let Slot::Occupied { prev: slot_prev, .. } = &mut self.slots[idx.0] {
            *slot_prev = prev;
        }
    }
}
