//! A session: the root of the Session → Channel → Segment tree, owning
//! every channel it mapped (spec §3, §4.7).

use std::path::PathBuf;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::password::AccessLevel;
use crate::sentinels::UUTC_NO_ENTRY;
use crate::time_slice::TimeSlice;

use super::handles::ChannelHandle;
use super::channel::Channel;

/// An open MED session: its mapped channels, the reference channel used
/// to resolve global timing, and the slice the caller ended up with
/// after intersecting every active channel's own bounds (spec §4.7
/// step 7).
#[derive(Debug)]
pub struct Session {
    /// Session name (the `.medd` directory's stem).
    pub name: String,
    /// Session directory path.
    pub path: PathBuf,
    /// Session-wide unique identifier, shared by every channel under it.
    pub session_uid: u64,
    /// Every channel this session mapped, active or merely enumerated
    /// (spec §4.7 step 3: `MAP_ALL_*_CHANNELS` maps channels beyond the
    /// caller's requested subset).
    channels: Vec<Channel>,
    /// The channel used to resolve global timing (spec §4.7 step 4):
    /// the first active time-series channel, falling back to the first
    /// active channel of any kind.
    pub reference_channel: Option<ChannelHandle>,
    /// UTC offset applied to on-disk relative timestamps, read from the
    /// reference channel's metadata section 3.
    pub recording_time_offset: i64,
    /// Absolute start time of the session, from the Universal Header.
    pub session_start_time: i64,
    /// The session's effective time bounds after step 7's intersection.
    pub slice: TimeSlice,
    /// Field-wise merged metadata across active channels, present only
    /// when `GENERATE_EPHEMERAL_DATA` was requested (spec §4.7 step 8).
    pub ephemeral_metadata: Option<Metadata>,
    /// The password access level this session was opened at (spec §7:
    /// a password failure "does not abort the open" — callers check
    /// this rather than the open itself erroring when it turns out no
    /// password unlocked anything above [`AccessLevel::None`]).
    pub access_level: AccessLevel,
    last_access_time: Instant,
}

impl Session {
    /// Builds a session shell with no channels mapped yet.
    #[must_use]
    pub fn new(name: String, path: PathBuf, session_uid: u64, session_start_time: i64) -> Self {
        Self {
            name,
            path,
            session_uid,
            channels: Vec::new(),
            reference_channel: None,
            recording_time_offset: 0,
            session_start_time,
            slice: TimeSlice::full(),
            ephemeral_metadata: None,
            access_level: AccessLevel::None,
            last_access_time: Instant::now(),
        }
    }

    /// Appends a channel, returning the handle it can be looked up by.
    pub fn push_channel(&mut self, channel: Channel) -> ChannelHandle {
        self.channels.push(channel);
        ChannelHandle::new(self.channels.len() - 1)
    }

    /// Looks up a channel by handle.
    #[must_use]
    pub fn channel(&self, handle: ChannelHandle) -> &Channel {
        &self.channels[handle.index()]
    }

    /// Mutable variant of [`Self::channel`].
    pub fn channel_mut(&mut self, handle: ChannelHandle) -> &mut Channel {
        &mut self.channels[handle.index()]
    }

    /// Every mapped channel, in mapping order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The session's reference channel, if one was selected.
    #[must_use]
    pub fn reference_channel(&self) -> Option<&Channel> {
        self.reference_channel.map(|h| self.channel(h))
    }

    /// Every channel marked `active` (spec §6 `CHANNEL_ACTIVE`), as
    /// opposed to merely mapped via `MAP_ALL_*_CHANNELS`.
    pub fn active_channels(&self) -> impl Iterator<Item = (ChannelHandle, &Channel)> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active)
            .map(|(i, c)| (ChannelHandle::new(i), c))
    }

    /// Converts a channel's on-disk relative time to an absolute UTC
    /// time using the session's `recording_time_offset`, or returns the
    /// sentinel unchanged if `relative` is already `UUTC_NO_ENTRY`.
    #[must_use]
    pub fn to_absolute_time(&self, relative: i64) -> i64 {
        if relative == UUTC_NO_ENTRY {
            relative
        } else {
            relative + self.recording_time_offset
        }
    }

    /// Intersects the session's slice with every active channel's own
    /// bounds (spec §4.7 step 7: "verify all active channels share the
    /// slice's time bounds; update session's slice to the
    /// intersection").
    pub fn intersect_active_channel_bounds(&mut self) -> Result<()> {
        let mut start = self.slice.start_time;
        let mut end = self.slice.end_time;

        for (_, channel) in self.active_channels() {
            if channel.slice.start_time != UUTC_NO_ENTRY {
                start = start.max(channel.slice.start_time);
            }
            if channel.slice.end_time != UUTC_NO_ENTRY {
                end = if end == UUTC_NO_ENTRY {
                    channel.slice.end_time
                } else {
                    end.min(channel.slice.end_time)
                };
            }
        }

        if start != UUTC_NO_ENTRY && end != UUTC_NO_ENTRY && start > end {
            return Err(Error::Inconsistent("active channels share no common time bounds"));
        }

        self.slice.start_time = start;
        self.slice.end_time = end;
        Ok(())
    }

    /// The instant this session was last touched.
    #[must_use]
    pub const fn last_access_time(&self) -> Instant {
        self.last_access_time
    }

    /// Bumps `last_access_time` to now.
    pub fn touch(&mut self) {
        self.last_access_time = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_type::FileType;
    use crate::metadata::{Section1, Section2, TimeSeriesSection2};
    use test_log::test;

    fn sample_metadata() -> Metadata {
        Metadata {
            section_1: Section1::default(),
            section_2: Some(Section2::TimeSeries(TimeSeriesSection2::default())),
            section_3: None,
        }
    }

    fn sample_channel(active: bool, start: i64, end: i64) -> Channel {
        let mut slice = TimeSlice::full();
        slice.start_time = start;
        slice.end_time = end;
        Channel::new(
            "chan".to_string(),
            PathBuf::from("chan.ticd"),
            FileType::TimeSeriesChannel,
            active,
            sample_metadata(),
            Vec::new(),
            0,
            slice,
        )
    }

    #[test]
    fn push_and_lookup_channel_round_trips() {
        let mut session = Session::new("sess".to_string(), PathBuf::from("sess.medd"), 1, 0);
        let handle = session.push_channel(sample_channel(true, 0, 1000));
        assert_eq!(session.channel(handle).name, "chan");
    }

    #[test]
    fn intersection_narrows_to_active_channel_overlap() {
        let mut session = Session::new("sess".to_string(), PathBuf::from("sess.medd"), 1, 0);
        session.push_channel(sample_channel(true, 100, 900));
        session.push_channel(sample_channel(true, 200, 800));
        session.push_channel(sample_channel(false, 0, 10000));
        session.intersect_active_channel_bounds().unwrap();
        assert_eq!(session.slice.start_time, 200);
        assert_eq!(session.slice.end_time, 800);
    }

    #[test]
    fn disjoint_active_channels_are_an_error() {
        let mut session = Session::new("sess".to_string(), PathBuf::from("sess.medd"), 1, 0);
        session.push_channel(sample_channel(true, 0, 100));
        session.push_channel(sample_channel(true, 200, 300));
        assert!(session.intersect_active_channel_bounds().is_err());
    }

    #[test]
    fn absolute_time_applies_recording_offset() {
        let mut session = Session::new("sess".to_string(), PathBuf::from("sess.medd"), 1, 0);
        session.recording_time_offset = 42;
        assert_eq!(session.to_absolute_time(100), 142);
        assert_eq!(session.to_absolute_time(UUTC_NO_ENTRY), UUTC_NO_ENTRY);
    }
}
