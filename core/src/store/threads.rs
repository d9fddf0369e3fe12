// Thread aggregation: group records by conversation address
//
// Drives selective backup only. Every record lands in exactly one group.

use super::backend::SmsFilter;
use crate::message::Sms;
use std::collections::{BTreeMap, BTreeSet};

/// Records grouped by address, each group in input order
pub fn group_by_thread(messages: &[Sms]) -> BTreeMap<&str, Vec<&Sms>> {
    let mut threads: BTreeMap<&str, Vec<&Sms>> = BTreeMap::new();
    for sms in messages {
        threads.entry(sms.address.as_str()).or_default().push(sms);
    }
    threads
}

/// Number of records per address
pub fn thread_sizes(messages: &[Sms]) -> BTreeMap<&str, usize> {
    let mut sizes: BTreeMap<&str, usize> = BTreeMap::new();
    for sms in messages {
        *sizes.entry(sms.address.as_str()).or_default() += 1;
    }
    sizes
}

/// One row of the thread list shown before a backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub address: String,
    pub count: usize,
}

/// Thread summaries ordered by address
pub fn thread_summaries(messages: &[Sms]) -> Vec<ThreadSummary> {
    thread_sizes(messages)
        .into_iter()
        .map(|(address, count)| ThreadSummary {
            address: address.to_string(),
            count,
        })
        .collect()
}

/// Which threads go into the next backup. Starts with everything selected.
#[derive(Debug, Clone)]
pub struct ThreadSelection {
    threads: Vec<ThreadSummary>,
    selected: BTreeSet<String>,
}

impl ThreadSelection {
    pub fn new(threads: Vec<ThreadSummary>) -> Self {
        let selected = threads.iter().map(|t| t.address.clone()).collect();
        Self { threads, selected }
    }

    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    pub fn is_selected(&self, address: &str) -> bool {
        self.selected.contains(address)
    }

    /// Flip one thread. Unknown addresses are ignored.
    pub fn toggle(&mut self, address: &str) {
        if !self.threads.iter().any(|t| t.address == address) {
            return;
        }
        if !self.selected.remove(address) {
            self.selected.insert(address.to_string());
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.threads.iter().map(|t| t.address.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_all_selected(&self) -> bool {
        self.selected.len() == self.threads.len()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Sum of record counts over the selected threads
    pub fn selected_records(&self) -> usize {
        self.threads
            .iter()
            .filter(|t| self.selected.contains(&t.address))
            .map(|t| t.count)
            .sum()
    }

    /// Filter to hand to the store when taking the backup
    pub fn to_filter(&self) -> SmsFilter {
        SmsFilter::Addresses(self.selected.clone())
    }
}
