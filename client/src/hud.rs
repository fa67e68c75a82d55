//! Text presentation of match events and connection quality

use log::{debug, info};
use shared::{format_time, MatchEvent, MatchListener, MatchState, Role, Winner};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Line shown for a state, from the point of view of `role`
pub fn state_banner(state: MatchState, role: Role) -> String {
    match state {
        MatchState::WaitingForPlayers => "Waiting for the other player...".to_string(),
        MatchState::ReadyToStart => "Both players ready! Type 'start' to begin".to_string(),
        MatchState::Countdown => "Get ready!".to_string(),
        MatchState::Playing => match role {
            Role::Cleaner => "Collect as much trash as you can!".to_string(),
            Role::Polluter => "Dump trash into the ocean!".to_string(),
        },
        MatchState::Finished => "Match over. Type 'restart' to play again".to_string(),
    }
}

pub fn winner_banner(winner: Winner, role: Role) -> String {
    let headline = match winner {
        Winner::Cleaner => "THE CLEANER WINS!",
        Winner::Polluter => "THE POLLUTER WINS!",
        Winner::Tie => "TIE!",
    };
    let verdict = match (winner, role) {
        (Winner::Tie, _) => "nobody",
        (Winner::Cleaner, Role::Cleaner) | (Winner::Polluter, Role::Polluter) => "you win",
        _ => "you lose",
    };
    format!("{} ({})", headline, verdict)
}

/// Formats one event, `None` for events that are only worth a debug line
pub fn describe_event(event: &MatchEvent, role: Role) -> Option<String> {
    match event {
        MatchEvent::StateChanged { to, .. } => Some(state_banner(*to, role)),
        MatchEvent::CountdownNumber(0) => Some("GO!".to_string()),
        MatchEvent::CountdownNumber(n) => Some(n.to_string()),
        MatchEvent::ScoreChanged { .. } => None,
        MatchEvent::InputEnabled(enabled) => match role {
            Role::Cleaner => Some(format!(
                "Controls {}",
                if *enabled { "enabled" } else { "disabled" }
            )),
            Role::Polluter => None,
        },
        MatchEvent::MatchFinished { snapshot, winner } => Some(format!(
            "{} | cleaner: {} trash collected | polluter: {} trash survived",
            winner_banner(*winner, role),
            snapshot.cleaner_score,
            snapshot.polluter_score
        )),
    }
}

/// Listener that logs every match event for a participant playing `role`
pub fn listener(role: Role) -> MatchListener {
    Box::new(move |event| match describe_event(event, role) {
        Some(line) => info!("{}", line),
        None => debug!("{:?}", event),
    })
}

/// Reliable-link health: unacknowledged directives and the worst resend count
pub fn link_summary(in_flight: usize, max_attempts: u32) -> String {
    match in_flight {
        0 => "link idle".to_string(),
        n => format!("{} unacked (sent up to {}x)", n, max_attempts),
    }
}

/// Prints the remaining time once per whole second while playing
#[derive(Debug, Default)]
pub struct TimerDisplay {
    last_shown: Option<String>,
}

impl TimerDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text when it differs from the last one shown
    pub fn update(&mut self, state: MatchState, remaining: f32) -> Option<String> {
        if state != MatchState::Playing {
            self.last_shown = None;
            return None;
        }

        let text = format_time(remaining);
        if self.last_shown.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last_shown = Some(text.clone());
        Some(text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PingSample {
    pub ping_ms: f32,
    pub timestamp: Instant,
}

/// Rolling window of round-trip samples taken from heartbeat echoes
#[derive(Debug)]
pub struct PingStats {
    samples: VecDeque<PingSample>,
    max_samples: usize,
    sample_interval: Duration,
    last_sample: Option<Instant>,
}

impl Default for PingStats {
    fn default() -> Self {
        Self::new(100, Duration::from_millis(100))
    }
}

impl PingStats {
    pub fn new(max_samples: usize, sample_interval: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            sample_interval,
            last_sample: None,
        }
    }

    /// Records a round trip, dropping it if the previous sample is too recent
    pub fn record(&mut self, ping_ms: f32, now: Instant) -> bool {
        if let Some(last) = self.last_sample {
            if now.duration_since(last) < self.sample_interval {
                return false;
            }
        }

        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(PingSample {
            ping_ms,
            timestamp: now,
        });
        self.last_sample = Some(now);
        true
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().map(|s| s.ping_ms)
    }

    pub fn average(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f32 = self.samples.iter().map(|s| s.ping_ms).sum();
        Some(sum / self.samples.len() as f32)
    }

    pub fn max(&self) -> Option<f32> {
        self.samples.iter().map(|s| s.ping_ms).reduce(f32::max)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn summary(&self) -> String {
        match (self.latest(), self.average(), self.max()) {
            (Some(latest), Some(avg), Some(max)) => format!(
                "ping {:.0}ms (avg {:.0}ms, max {:.0}ms)",
                latest, avg, max
            ),
            _ => "ping n/a".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::ScoreSnapshot;

    #[test]
    fn test_winner_banner_perspective() {
        assert_eq!(
            winner_banner(Winner::Cleaner, Role::Cleaner),
            "THE CLEANER WINS! (you win)"
        );
        assert_eq!(
            winner_banner(Winner::Cleaner, Role::Polluter),
            "THE CLEANER WINS! (you lose)"
        );
        assert_eq!(winner_banner(Winner::Tie, Role::Polluter), "TIE! (nobody)");
    }

    #[test]
    fn test_countdown_zero_reads_go() {
        assert_eq!(
            describe_event(&MatchEvent::CountdownNumber(0), Role::Cleaner),
            Some("GO!".to_string())
        );
        assert_eq!(
            describe_event(&MatchEvent::CountdownNumber(3), Role::Cleaner),
            Some("3".to_string())
        );
    }

    #[test]
    fn test_match_finished_lists_both_scores() {
        let event = MatchEvent::MatchFinished {
            snapshot: ScoreSnapshot::new(5, 2),
            winner: Winner::Cleaner,
        };
        let line = describe_event(&event, Role::Polluter).unwrap();
        assert!(line.contains("5 trash collected"));
        assert!(line.contains("2 trash survived"));
        assert!(line.contains("you lose"));
    }

    #[test]
    fn test_polluter_ignores_input_toggle() {
        assert!(describe_event(&MatchEvent::InputEnabled(true), Role::Polluter).is_none());
        assert!(describe_event(&MatchEvent::InputEnabled(true), Role::Cleaner).is_some());
    }

    #[test]
    fn test_link_summary() {
        assert_eq!(link_summary(0, 0), "link idle");
        assert_eq!(link_summary(2, 3), "2 unacked (sent up to 3x)");
    }

    #[test]
    fn test_timer_display_once_per_second() {
        let mut timer = TimerDisplay::new();
        assert_eq!(timer.update(MatchState::Playing, 90.0), Some("01:30".to_string()));
        assert_eq!(timer.update(MatchState::Playing, 89.6), Some("01:29".to_string()));
        assert_eq!(timer.update(MatchState::Playing, 89.1), None);
        assert_eq!(timer.update(MatchState::Finished, 0.0), None);
    }

    #[test]
    fn test_ping_stats_window() {
        let mut stats = PingStats::new(3, Duration::from_millis(100));
        let start = Instant::now();
        assert!(stats.is_empty());
        assert_eq!(stats.summary(), "ping n/a");

        for (i, ping) in [10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            assert!(stats.record(*ping, start + Duration::from_millis(100 * i as u64)));
        }
        assert_eq!(stats.len(), 3);
        assert_approx_eq!(stats.average().unwrap(), 30.0);
        assert_approx_eq!(stats.max().unwrap(), 40.0);
        assert_approx_eq!(stats.latest().unwrap(), 40.0);
    }

    #[test]
    fn test_ping_stats_rate_limited() {
        let mut stats = PingStats::default();
        let start = Instant::now();
        assert!(stats.record(12.0, start));
        assert!(!stats.record(99.0, start + Duration::from_millis(20)));
        assert_eq!(stats.len(), 1);
    }
}
