//! Job table: JID issuance and lookup (§3).
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/entity.py`'s
//! `Job.table`/`Job.last_jid` class state, reshaped into a plain struct per
//! this crate's "dynamic classes as state" design note so tests can hold
//! independent tables instead of sharing process-global state.

use std::collections::BTreeMap;

use crate::job::Job;

/// Holds every job currently in flight, keyed by JID, plus the monotonic
/// counter used to issue fresh ones.
#[derive(Default)]
pub struct JobTable {
    jobs: BTreeMap<u64, Job>,
    last_jid: u64,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    /// Issues a fresh JID and inserts `make_job(jid)`'s result under it.
    pub fn insert_new(&mut self, make_job: impl FnOnce(u64) -> Job) -> u64 {
        self.last_jid += 1;
        let jid = self.last_jid;
        self.jobs.insert(jid, make_job(jid));
        jid
    }

    pub fn get(&self, jid: u64) -> Option<&Job> {
        self.jobs.get(&jid)
    }

    pub fn get_mut(&mut self, jid: u64) -> Option<&mut Job> {
        self.jobs.get_mut(&jid)
    }

    pub fn contains(&self, jid: u64) -> bool {
        self.jobs.contains_key(&jid)
    }

    pub fn remove(&mut self, jid: u64) -> Option<Job> {
        self.jobs.remove(&jid)
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Job)> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u64, &mut Job)> {
        self.jobs.iter_mut()
    }

    /// JIDs of every job currently running on `node`, for roll-call
    /// reconciliation (§4.6).
    pub fn jids_on_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = u64> + 'a {
        self.jobs
            .iter()
            .filter(move |(_, job)| job.node() == node)
            .map(|(jid, _)| *jid)
    }

    /// Finds the job whose output message is `message_id`, for reply-to-job
    /// dispatch (§C.2, `JobControlCog.job_for_reply`).
    pub fn find_by_message_id(&self, message_id: &str) -> Option<u64> {
        self.jobs
            .iter()
            .find(|(_, job)| job.output_message_id() == message_id)
            .map(|(jid, _)| *jid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OutputMessage;

    fn msg() -> OutputMessage {
        OutputMessage {
            channel: "general".to_owned(),
            message_id: "1".to_owned(),
        }
    }

    #[test]
    fn jids_are_monotonic_and_start_at_one() {
        let mut table = JobTable::new();
        let a = table.insert_new(|jid| Job::new(jid, "hal", "alice", msg()));
        let b = table.insert_new(|jid| Job::new(jid, "hal", "alice", msg()));
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn remove_drops_from_table() {
        let mut table = JobTable::new();
        let jid = table.insert_new(|jid| Job::new(jid, "hal", "alice", msg()));
        assert!(table.contains(jid));
        table.remove(jid);
        assert!(!table.contains(jid));
        assert!(!table.has_jobs());
    }

    #[test]
    fn jids_on_node_filters_correctly() {
        let mut table = JobTable::new();
        table.insert_new(|jid| Job::new(jid, "hal", "alice", msg()));
        table.insert_new(|jid| Job::new(jid, "am", "alice", msg()));
        table.insert_new(|jid| Job::new(jid, "hal", "alice", msg()));
        let mut hal_jids: Vec<u64> = table.jids_on_node("hal").collect();
        hal_jids.sort();
        assert_eq!(hal_jids, vec![1, 3]);
    }
}
