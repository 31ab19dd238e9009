//! Chapter navigation state machine

use log::debug;

/// Where a locked controller is in its jump
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockPhase {
    /// Seek issued, renderer has not reported completion
    Seeking,
    /// Async seek completed; released on the next tick so trailing scroll
    /// events from the same jump are still dropped
    Draining,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Locked(LockPhase),
}

/// Inputs to the navigation controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavCommand {
    /// Programmatic jump
    GoTo(usize),
    Next,
    Prev,
    /// Passive relocation reported by the viewport or renderer
    Relocated(usize),
    /// The seek issued for the current jump has settled
    SeekCompleted { synchronous: bool },
    /// One scheduler turn has passed
    Tick,
}

/// Outputs the session must act on, in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavEffect {
    ChapterChanged(usize),
    AvailabilityChanged { has_prev: bool, has_next: bool },
    /// Issue the format-specific seek to this chapter
    Seek(usize),
}

/// Single writer of the current chapter index.
#[derive(Clone, Debug)]
pub struct NavigationController {
    chapter_count: usize,
    current: usize,
    state: NavState,
    availability: (bool, bool),
}

impl NavigationController {
    #[must_use]
    pub fn new(chapter_count: usize, initial: usize) -> Self {
        let chapter_count = chapter_count.max(1);
        let current = initial.min(chapter_count - 1);
        let mut controller = Self {
            chapter_count,
            current,
            state: NavState::Idle,
            availability: (false, false),
        };
        controller.availability = controller.compute_availability();
        controller
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, NavState::Locked(_))
    }

    pub fn chapter_count(&self) -> usize {
        self.chapter_count
    }

    pub fn has_prev(&self) -> bool {
        self.availability.0
    }

    pub fn has_next(&self) -> bool {
        self.availability.1
    }

    fn compute_availability(&self) -> (bool, bool) {
        (self.current > 0, self.current + 1 < self.chapter_count)
    }

    /// Effects describing the initial state, for observers attached at open.
    #[must_use]
    pub fn initial_effects(&self) -> Vec<NavEffect> {
        vec![
            NavEffect::ChapterChanged(self.current),
            NavEffect::AvailabilityChanged {
                has_prev: self.has_prev(),
                has_next: self.has_next(),
            },
        ]
    }

    fn move_to(&mut self, index: usize, effects: &mut Vec<NavEffect>) {
        self.current = index;
        effects.push(NavEffect::ChapterChanged(index));
        let availability = self.compute_availability();
        if availability != self.availability {
            self.availability = availability;
            effects.push(NavEffect::AvailabilityChanged {
                has_prev: availability.0,
                has_next: availability.1,
            });
        }
    }

    fn go_to(&mut self, index: usize) -> Vec<NavEffect> {
        if index >= self.chapter_count {
            debug!(
                "Ignoring jump to {index}, only {} chapters",
                self.chapter_count
            );
            return vec![];
        }
        if self.is_locked() {
            debug!("Ignoring jump to {index} while a jump is in flight");
            return vec![];
        }
        self.state = NavState::Locked(LockPhase::Seeking);
        let mut effects = Vec::with_capacity(3);
        self.move_to(index, &mut effects);
        effects.push(NavEffect::Seek(index));
        effects
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: NavCommand) -> Vec<NavEffect> {
        match cmd {
            NavCommand::GoTo(index) => self.go_to(index),

            NavCommand::Next => {
                if self.current + 1 < self.chapter_count {
                    self.go_to(self.current + 1)
                } else {
                    vec![]
                }
            }

            NavCommand::Prev => {
                if self.current > 0 {
                    self.go_to(self.current - 1)
                } else {
                    vec![]
                }
            }

            NavCommand::Relocated(index) => {
                if self.is_locked() {
                    debug!("Dropping relocation to {index} during jump to {}", self.current);
                    return vec![];
                }
                if index >= self.chapter_count || index == self.current {
                    return vec![];
                }
                let mut effects = Vec::with_capacity(2);
                self.move_to(index, &mut effects);
                effects
            }

            NavCommand::SeekCompleted { synchronous } => {
                match (self.state, synchronous) {
                    (NavState::Locked(LockPhase::Seeking), true) => self.state = NavState::Idle,
                    (NavState::Locked(LockPhase::Seeking), false) => {
                        self.state = NavState::Locked(LockPhase::Draining)
                    }
                    _ => debug!("Stray seek completion in state {:?}", self.state),
                }
                vec![]
            }

            NavCommand::Tick => {
                if self.state == NavState::Locked(LockPhase::Draining) {
                    self.state = NavState::Idle;
                }
                vec![]
            }
        }
    }
}
