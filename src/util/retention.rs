use std::collections::HashSet;

use chrono::{Datelike, NaiveDateTime};

/// How many daily, weekly and monthly archives to keep when pruning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// A daily archive is the newest archive of a day.
    pub daily: usize,

    /// A weekly archive is the newest archive of an ISO week.
    pub weekly: usize,

    /// A monthly archive is the newest archive of a month.
    pub monthly: usize,
}

impl RetentionPolicy {
    /// 7 daily, 4 weekly and 6 monthly archives.
    pub const DEFAULT: Self = Self {
        daily: 7,
        weekly: 4,
        monthly: 6,
    };

    /// Upper bound of archives surviving a prune.
    pub fn max_kept(&self) -> usize {
        self.daily + self.weekly + self.monthly
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Period {
    Day(i32, u32),
    Week(i32, u32),
    Month(i32, u32),
}

type Rule = fn(&NaiveDateTime) -> Period;

fn daily(date: &NaiveDateTime) -> Period {
    Period::Day(date.year(), date.ordinal())
}

fn weekly(date: &NaiveDateTime) -> Period {
    let week = date.iso_week();
    Period::Week(week.year(), week.week())
}

fn monthly(date: &NaiveDateTime) -> Period {
    Period::Month(date.year(), date.month())
}

/// Evaluates a [RetentionPolicy] the way `borg prune` does.
///
/// The rules are applied from daily to monthly. Walking the archives from
/// newest to oldest, a rule keeps the first archive of every period it has
/// not seen yet, until its quota is used up. An archive that is already kept
/// by an earlier rule does not count towards a later rule.
///
/// Borg 1.2 and later additionally keep the oldest archive for every rule
/// whose quota is not filled, see [Retention::keep_oldest].
#[derive(Clone, Debug)]
pub struct Retention {
    pub policy: RetentionPolicy,
    pub keep_oldest: bool,
}

impl From<RetentionPolicy> for Retention {
    fn from(policy: RetentionPolicy) -> Self {
        Self::new(policy)
    }
}

impl Retention {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            keep_oldest: false,
        }
    }

    /// Keep the oldest archive when a rule runs out of archives before its
    /// quota is used up.
    pub fn keep_oldest(mut self) -> Self {
        self.keep_oldest = true;
        self
    }

    /// Splits `items` into `(kept, pruned)`, both ordered newest first.
    pub fn partition<T>(
        &self,
        mut items: Vec<T>,
        date: impl Fn(&T) -> NaiveDateTime,
    ) -> (Vec<T>, Vec<T>) {
        items.sort_by_key(|item| std::cmp::Reverse(date(item)));
        let dates: Vec<_> = items.iter().map(&date).collect();

        let mut keep = HashSet::new();
        let rules: [(Rule, usize); 3] = [
            (daily, self.policy.daily),
            (weekly, self.policy.weekly),
            (monthly, self.policy.monthly),
        ];
        for (rule, quota) in rules {
            if quota == 0 {
                continue;
            }

            let mut last = None;
            let mut taken = 0;
            for (idx, date) in dates.iter().enumerate() {
                let period = rule(date);
                if last == Some(period) {
                    continue;
                }
                last = Some(period);

                if keep.insert(idx) {
                    taken += 1;
                    if taken == quota {
                        break;
                    }
                }
            }

            if self.keep_oldest && taken < quota && !dates.is_empty() {
                keep.insert(dates.len() - 1);
            }
        }

        let (kept, pruned): (Vec<_>, Vec<_>) = items
            .into_iter()
            .enumerate()
            .partition(|(idx, _)| keep.contains(idx));

        (
            kept.into_iter().map(|(_, item)| item).collect(),
            pruned.into_iter().map(|(_, item)| item).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn retention() -> Retention {
        RetentionPolicy::DEFAULT.into()
    }

    #[test]
    fn eighth_daily_archive_evicts_the_oldest() {
        // Monday 2026-10-05 up to Monday 2026-10-12
        let archives: Vec<_> = (5..=12).map(|day| at(2026, 10, day, 3)).collect();

        let (kept, pruned) = retention().partition(archives, |date| *date);

        assert_eq!(kept.len(), 7);
        assert_eq!(pruned, vec![at(2026, 10, 5, 3)]);
        assert_eq!(kept.first(), Some(&at(2026, 10, 12, 3)));
    }

    #[test]
    fn a_year_of_daily_archives_is_capped() {
        let start = at(2025, 1, 1, 2);
        let archives: Vec<_> = (0..365).map(|n| start + Duration::days(n)).collect();

        let (kept, pruned) = retention().partition(archives, |date| *date);

        assert_eq!(kept.len(), RetentionPolicy::DEFAULT.max_kept());
        assert_eq!(kept.len() + pruned.len(), 365);
    }

    #[test]
    fn only_the_newest_archive_of_a_day_counts_as_daily() {
        let archives = vec![
            at(2026, 10, 12, 1),
            at(2026, 10, 12, 13),
            at(2026, 10, 12, 23),
        ];

        let (kept, pruned) = retention().partition(archives, |date| *date);

        assert_eq!(kept, vec![at(2026, 10, 12, 23)]);
        assert_eq!(pruned, vec![at(2026, 10, 12, 13), at(2026, 10, 12, 1)]);
    }

    #[test]
    fn weekly_and_monthly_reach_beyond_the_dailies() {
        let policy = RetentionPolicy {
            daily: 1,
            weekly: 1,
            monthly: 1,
        };
        let archives = vec![
            at(2026, 10, 12, 3), // daily
            at(2026, 10, 11, 3), // newest of the previous ISO week
            at(2026, 10, 10, 3),
            at(2026, 9, 30, 3), // newest of september
            at(2026, 9, 29, 3),
        ];

        let (kept, _) = Retention::new(policy).partition(archives, |date| *date);

        assert_eq!(
            kept,
            vec![at(2026, 10, 12, 3), at(2026, 10, 11, 3), at(2026, 9, 30, 3)]
        );
    }

    #[test]
    fn zero_quota_keeps_nothing() {
        let policy = RetentionPolicy {
            daily: 0,
            weekly: 0,
            monthly: 0,
        };
        let archives = vec![at(2026, 10, 12, 3)];

        let (kept, pruned) = Retention::new(policy).partition(archives, |date| *date);

        assert!(kept.is_empty());
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn unfilled_rules_keep_the_oldest_archive() {
        let retention = retention().keep_oldest();

        // the weekly rule finds only two weeks and falls back to the oldest
        let archives: Vec<_> = (5..=12).map(|day| at(2026, 10, day, 3)).collect();
        let (kept, pruned) = retention.partition(archives, |date| *date);
        assert_eq!(kept.len(), 8);
        assert!(pruned.is_empty());

        // Saturday 2026-10-03 is the oldest, so the Monday dump goes
        let archives: Vec<_> = (3..=12).map(|day| at(2026, 10, day, 3)).collect();
        let (kept, pruned) = retention.partition(archives, |date| *date);
        assert_eq!(pruned, vec![at(2026, 10, 5, 3)]);
        assert_eq!(kept.last(), Some(&at(2026, 10, 3, 3)));
        assert!(kept.contains(&at(2026, 10, 4, 3)));
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut archives: Vec<_> = (5..=12).map(|day| at(2026, 10, day, 3)).collect();
        archives.reverse();
        archives.swap(2, 6);

        let (_, pruned) = retention().partition(archives, |date| *date);

        assert_eq!(pruned, vec![at(2026, 10, 5, 3)]);
    }
}
