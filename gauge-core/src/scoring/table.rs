//! Per-condition scorer table.
//!
//! Scorers are addressed by `(ScorerKind, TeamMemberRef)`, where
//! [`TeamMemberRef::Aggregate`] is the binding for "all watched members".
//! Real-time scorers are kept apart: they feed the live assessment rather
//! than the end-of-session report, and are not tracked per member.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use super::scorer::{Scorer, ScorerKind};
use crate::assessment::AssessmentLevel;
use crate::clock::SharedClock;
use crate::entity::{SessionMember, TeamMemberRef};
use crate::error::ScoringError;
use crate::report::{OVERRIDE_LABEL, OVERRIDE_UNITS, RawScoreRecord, ScoreOverride};

/// Scorers for one condition instance.
pub struct ScorerTable {
    clock: SharedClock,
    scorers: BTreeMap<ScorerKind, BTreeMap<TeamMemberRef, Scorer>>,
    real_time: BTreeMap<ScorerKind, Scorer>,
}

impl ScorerTable {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            scorers: BTreeMap::new(),
            real_time: BTreeMap::new(),
        }
    }

    /// Register a report scorer bound to `member`.
    pub fn add_scorer(
        &mut self,
        scorer: Scorer,
        member: TeamMemberRef,
    ) -> Result<(), ScoringError> {
        let by_member = self.scorers.entry(scorer.kind()).or_default();
        if by_member.contains_key(&member) {
            return Err(ScoringError::DuplicateScorer {
                kind: scorer.kind().to_string(),
                member: member.display_name().to_string(),
            });
        }

        debug!(scorer = %scorer, member = %member, "Added scorer");
        by_member.insert(member, scorer);
        Ok(())
    }

    /// Register a real-time assessment scorer. One per kind.
    pub fn add_real_time_scorer(&mut self, scorer: Scorer) -> Result<(), ScoringError> {
        let kind = scorer.kind();
        if self.real_time.contains_key(&kind) {
            return Err(ScoringError::DuplicateRealTimeScorer(kind.to_string()));
        }

        debug!(scorer = %scorer, "Added real-time scorer");
        self.real_time.insert(kind, scorer);
        Ok(())
    }

    pub fn has_scorers(&self) -> bool {
        self.scorers.values().any(|by_member| !by_member.is_empty())
    }

    pub fn scorer(&self, kind: ScorerKind, member: &TeamMemberRef) -> Option<&Scorer> {
        self.scorers.get(&kind).and_then(|by_member| by_member.get(member))
    }

    pub fn real_time_scorer(&self, kind: ScorerKind) -> Option<&Scorer> {
        self.real_time.get(&kind)
    }

    /// Prepare per-member scorers once the assessed roles are known.
    ///
    /// Ensures an aggregate duration scorer exists, then copies each unbound
    /// duration and completion-time scorer to every member that lacks one.
    pub fn bind_team_members(&mut self, members: &[String]) {
        self.ensure_active_scorer();

        for kind in [ScorerKind::ViolationTime, ScorerKind::CompletionTime] {
            let Some(by_member) = self.scorers.get_mut(&kind) else {
                continue;
            };
            let Some(template) = by_member
                .get(&TeamMemberRef::Aggregate)
                .map(Scorer::deep_copy)
            else {
                continue;
            };

            for name in members {
                let member = TeamMemberRef::member(name.as_str());
                if by_member.contains_key(&member) {
                    continue;
                }
                trace!(scorer = %template, member = %member, "Copying scorer for team member");
                by_member.insert(member, template.deep_copy());
            }
        }
    }

    /// Begin a scoring event of `events` occurrences.
    ///
    /// With no members every bound scorer is affected; otherwise the named
    /// members plus the aggregate.
    pub fn start_event(
        &mut self,
        events: u32,
        members: &[TeamMemberRef],
    ) -> Result<(), ScoringError> {
        if events < 1 {
            return Err(ScoringError::InvalidEventCount(events));
        }

        let now = self.clock.now_ms();
        let targets = targets(members);
        trace!(events, members = members.len(), "Scoring event started");

        if let Some(by_member) = self.scorers.get_mut(&ScorerKind::ViolationTime) {
            for (member, scorer) in by_member.iter_mut() {
                if targets.as_ref().is_none_or(|t| t.contains(member)) {
                    scorer.start(now);
                }
            }
        }
        if let Some(scorer) = self.real_time.get_mut(&ScorerKind::ViolationTime) {
            scorer.start(now);
        }

        if let Some(by_member) = self.scorers.get_mut(&ScorerKind::Count) {
            for (member, scorer) in by_member.iter_mut() {
                if targets.as_ref().is_none_or(|t| t.contains(member)) {
                    scorer.add(u64::from(events));
                }
            }
        }
        if let Some(scorer) = self.real_time.get_mut(&ScorerKind::Count) {
            scorer.add(u64::from(events));
        }

        Ok(())
    }

    /// End a scoring event.
    ///
    /// With no members the aggregate and the real-time duration scorer stop,
    /// signalling that nobody is violating right now.
    pub fn end_event(&mut self, members: &[TeamMemberRef]) {
        let now = self.clock.now_ms();
        trace!(members = members.len(), "Scoring event ended");

        if let Some(by_member) = self.scorers.get_mut(&ScorerKind::ViolationTime) {
            if members.is_empty() {
                if let Some(scorer) = by_member.get_mut(&TeamMemberRef::Aggregate) {
                    scorer.stop(now);
                }
            } else {
                for member in members {
                    if let Some(scorer) = by_member.get_mut(member) {
                        scorer.stop(now);
                    }
                }
            }
        }

        if members.is_empty() {
            if let Some(scorer) = self.real_time.get_mut(&ScorerKind::ViolationTime) {
                scorer.stop(now);
            }
        }
    }

    /// Whether a scoring event is ongoing for every named member, or for the
    /// aggregate when none are named.
    ///
    /// Naming a member with no duration scorer is logged and answers `false`.
    pub fn is_active(&mut self, members: &[TeamMemberRef]) -> bool {
        if members.is_empty() {
            self.ensure_active_scorer();
            return self
                .scorer(ScorerKind::ViolationTime, &TeamMemberRef::Aggregate)
                .is_some_and(Scorer::has_started);
        }

        let Some(by_member) = self
            .scorers
            .get(&ScorerKind::ViolationTime)
            .filter(|m| !m.is_empty())
        else {
            warn!(
                members = members.len(),
                "Cannot check scoring activity: no duration scorers, were team members bound?"
            );
            return false;
        };

        for member in members {
            match by_member.get(member) {
                None => {
                    warn!(
                        member = %member,
                        "Cannot check scoring activity: no duration scorer for team member"
                    );
                    return false;
                }
                Some(scorer) if !scorer.has_started() => return false,
                Some(_) => {}
            }
        }
        true
    }

    /// Record the start-to-completion time in every completion-time scorer.
    pub fn finalize_completion(&mut self, start_ms: u64, end_ms: u64) {
        let elapsed = end_ms.saturating_sub(start_ms);
        if let Some(by_member) = self.scorers.get_mut(&ScorerKind::CompletionTime) {
            for scorer in by_member.values_mut() {
                scorer.set_time_to_complete(elapsed);
            }
        }
    }

    /// Lowest assessment across the real-time scorers, or `None` when none
    /// were authored.
    pub fn authored_real_time_assessment(&self) -> Option<AssessmentLevel> {
        let now = self.clock.now_ms();
        self.real_time
            .values()
            .map(|scorer| scorer.assessment(now))
            .reduce(AssessmentLevel::lowest_known)
    }

    /// Snapshot reportable scorers into score records.
    ///
    /// `assessed` is the list of role names this condition assesses; empty
    /// means every session member is in the audience. Running duration
    /// scorers are closed out first.
    pub fn collect_scores(
        &mut self,
        session_members: &[SessionMember],
        assessed: &[String],
        score_override: Option<&ScoreOverride>,
    ) -> Vec<RawScoreRecord> {
        let now = self.clock.now_ms();
        let audience = Audience::resolve(session_members, assessed);
        let mut records = Vec::new();

        for by_member in self.scorers.values_mut() {
            for (member, scorer) in by_member.iter_mut() {
                scorer.close_out(now);
                if scorer.is_internal_only() {
                    continue;
                }

                let assessment =
                    score_override.map_or_else(|| scorer.assessment(now), |o| o.assessment);
                let recipients = match member {
                    TeamMemberRef::Aggregate => {
                        if audience.single_player {
                            // Same score as the single member's scorer
                            continue;
                        }
                        if audience.usernames.is_empty() {
                            warn!(
                                scorer = %scorer,
                                "No usernames for assessed team members, skipping scores"
                            );
                            return records;
                        }
                        audience.usernames.clone()
                    }
                    TeamMemberRef::Learner => {
                        if audience.learner.is_empty() {
                            debug!(scorer = %scorer, "No learner in session, skipping score");
                            continue;
                        }
                        audience.learner.clone()
                    }
                    TeamMemberRef::Member(name) => match audience.by_role.get(name) {
                        Some(username) => BTreeSet::from([username.clone()]),
                        None => continue,
                    },
                };

                let mut record = RawScoreRecord::new(
                    scorer.name(),
                    scorer.raw_score(now),
                    scorer.units().as_str(),
                    assessment,
                    recipients,
                );
                if let Some(o) = score_override {
                    record = record.with_override(o);
                }
                records.push(record);
            }
        }

        if records.is_empty() {
            if let Some(o) = score_override {
                records.push(
                    RawScoreRecord::new(
                        OVERRIDE_LABEL,
                        "1",
                        OVERRIDE_UNITS,
                        o.assessment,
                        audience.usernames.clone(),
                    )
                    .with_override(o),
                );
                for username in &audience.usernames {
                    records.push(
                        RawScoreRecord::new(
                            OVERRIDE_LABEL,
                            "1",
                            OVERRIDE_UNITS,
                            o.assessment,
                            BTreeSet::from([username.clone()]),
                        )
                        .with_override(o),
                    );
                }
            }
        }

        records
    }

    fn ensure_active_scorer(&mut self) {
        let by_member = self.scorers.entry(ScorerKind::ViolationTime).or_default();
        if by_member.is_empty() {
            debug!("Adding internal aggregate duration scorer");
            by_member.insert(TeamMemberRef::Aggregate, Scorer::actively_violating());
        }
    }
}

impl std::fmt::Debug for ScorerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerTable")
            .field("scorers", &self.scorers)
            .field("real_time", &self.real_time)
            .finish()
    }
}

/// `None` means every bound scorer.
fn targets(members: &[TeamMemberRef]) -> Option<BTreeSet<TeamMemberRef>> {
    if members.is_empty() {
        return None;
    }
    let mut set: BTreeSet<_> = members.iter().cloned().collect();
    set.insert(TeamMemberRef::Aggregate);
    Some(set)
}

/// Usernames score records are addressed to.
struct Audience {
    usernames: BTreeSet<String>,
    by_role: BTreeMap<String, String>,
    /// Recipients of learner-bound scores: everyone when no roles are
    /// assessed, else the lone player if there is one.
    learner: BTreeSet<String>,
    single_player: bool,
}

impl Audience {
    fn resolve(session_members: &[SessionMember], assessed: &[String]) -> Self {
        let mut usernames = BTreeSet::new();
        let mut by_role = BTreeMap::new();

        if assessed.is_empty() {
            usernames.extend(
                session_members
                    .iter()
                    .filter(|m| !m.username.trim().is_empty())
                    .map(|m| m.username.clone()),
            );
            return Self {
                learner: usernames.clone(),
                usernames,
                by_role,
                single_player: false,
            };
        }

        let lone_session = session_members.len() == 1;
        for role in assessed {
            let player = session_members.iter().find(|m| match &m.team_member {
                None => lone_session,
                Some(name) => name == role,
            });
            if let Some(player) = player.filter(|p| !p.username.trim().is_empty()) {
                usernames.insert(player.username.clone());
                by_role.insert(role.clone(), player.username.clone());
            }
        }

        let single_player = usernames.len() == 1;
        let learner = if single_player {
            usernames.clone()
        } else {
            BTreeSet::new()
        };
        Self {
            usernames,
            by_role,
            learner,
            single_player,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scoring::{Comparison, ScoreRule, Units};
    use std::sync::Arc;

    fn table() -> (ScorerTable, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (ScorerTable::new(clock.clone()), clock)
    }

    fn alpha() -> TeamMemberRef {
        TeamMemberRef::member("alpha")
    }

    fn bravo() -> TeamMemberRef {
        TeamMemberRef::member("bravo")
    }

    fn duration(name: &str) -> Scorer {
        Scorer::violation_time(name, Units::Milliseconds, vec![]).unwrap()
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (mut table, _) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();

        let err = table
            .add_scorer(duration("Again"), TeamMemberRef::Aggregate)
            .unwrap_err();
        assert_eq!(
            err,
            ScoringError::DuplicateScorer {
                kind: "violation_time".to_string(),
                member: "all".to_string(),
            }
        );

        // Same kind for a different member is fine
        assert!(table.add_scorer(duration("Alpha time"), alpha()).is_ok());
    }

    #[test]
    fn zero_event_multiplicity_is_rejected() {
        let (mut table, _) = table();
        assert_eq!(
            table.start_event(0, &[]),
            Err(ScoringError::InvalidEventCount(0))
        );
    }

    #[test]
    fn bind_copies_unbound_duration_scorers_per_member() {
        let (mut table, _) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();
        table
            .add_scorer(Scorer::count("Flags", vec![]).unwrap(), TeamMemberRef::Aggregate)
            .unwrap();

        table.bind_team_members(&["alpha".to_string(), "bravo".to_string()]);

        let copy = table.scorer(ScorerKind::ViolationTime, &alpha()).unwrap();
        assert_eq!(copy.name(), "Time in sector");
        assert!(table.scorer(ScorerKind::ViolationTime, &bravo()).is_some());
        assert!(table.scorer(ScorerKind::Count, &alpha()).is_none());
    }

    #[test]
    fn bind_synthesizes_internal_scorer_when_none_authored() {
        let (mut table, _) = table();
        table.bind_team_members(&["alpha".to_string()]);

        let aggregate = table
            .scorer(ScorerKind::ViolationTime, &TeamMemberRef::Aggregate)
            .unwrap();
        assert!(aggregate.is_internal_only());
        let member = table.scorer(ScorerKind::ViolationTime, &alpha()).unwrap();
        assert!(member.is_internal_only());
    }

    #[test]
    fn double_start_is_noop_and_interval_accumulates() {
        let (mut table, clock) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();

        table.start_event(1, &[]).unwrap();
        clock.set(1_000);
        table.start_event(1, &[]).unwrap();
        clock.set(3_000);
        table.end_event(&[]);

        let scorer = table
            .scorer(ScorerKind::ViolationTime, &TeamMemberRef::Aggregate)
            .unwrap();
        assert_eq!(scorer.raw_value(10_000), 3_000);
    }

    #[test]
    fn is_active_requires_all_named_members() {
        let (mut table, _) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();
        table.bind_team_members(&["alpha".to_string(), "bravo".to_string()]);

        table.start_event(1, &[alpha()]).unwrap();
        assert!(table.is_active(&[alpha()]));
        assert!(table.is_active(&[]), "aggregate starts with any member");
        assert!(!table.is_active(&[alpha(), bravo()]));

        table.start_event(1, &[bravo()]).unwrap();
        assert!(table.is_active(&[alpha(), bravo()]));

        table.end_event(&[alpha()]);
        assert!(!table.is_active(&[alpha(), bravo()]));
        assert!(table.is_active(&[bravo()]));
    }

    #[test]
    fn is_active_for_unknown_member_is_false() {
        let (mut table, _) = table();
        assert!(!table.is_active(&[alpha()]));

        table.bind_team_members(&["alpha".to_string()]);
        assert!(!table.is_active(&[TeamMemberRef::member("charlie")]));
    }

    #[test]
    fn aggregate_is_active_lazily_creates_internal_scorer() {
        let (mut table, _) = table();
        assert!(!table.has_scorers());
        assert!(!table.is_active(&[]));
        assert!(table.has_scorers());

        table.start_event(1, &[]).unwrap();
        assert!(table.is_active(&[]));
    }

    #[test]
    fn start_without_members_affects_every_binding() {
        let (mut table, _) = table();
        table
            .add_scorer(Scorer::count("Flags", vec![]).unwrap(), TeamMemberRef::Aggregate)
            .unwrap();
        table
            .add_scorer(Scorer::count("Alpha flags", vec![]).unwrap(), alpha())
            .unwrap();
        table
            .add_scorer(Scorer::count("Bravo flags", vec![]).unwrap(), bravo())
            .unwrap();

        table.start_event(2, &[]).unwrap();
        table.start_event(1, &[alpha()]).unwrap();

        let value = |m: &TeamMemberRef| table.scorer(ScorerKind::Count, m).unwrap().raw_value(0);
        assert_eq!(value(&TeamMemberRef::Aggregate), 3);
        assert_eq!(value(&alpha()), 3);
        assert_eq!(value(&bravo()), 2);
    }

    #[test]
    fn real_time_assessment_lowest_wins() {
        let (mut table, clock) = table();
        assert_eq!(table.authored_real_time_assessment(), None);

        table
            .add_real_time_scorer(
                Scorer::count(
                    "Flags",
                    vec![
                        ScoreRule::new(Comparison::LessThan, 2, AssessmentLevel::AboveExpectation),
                        ScoreRule::new(
                            Comparison::GreaterThanOrEqual,
                            2,
                            AssessmentLevel::AtExpectation,
                        ),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        table
            .add_real_time_scorer(
                Scorer::violation_time(
                    "Time violating",
                    Units::Milliseconds,
                    vec![ScoreRule::new(
                        Comparison::GreaterThan,
                        5_000,
                        AssessmentLevel::BelowExpectation,
                    )],
                )
                .unwrap(),
            )
            .unwrap();
        assert!(matches!(
            table.add_real_time_scorer(Scorer::count("Again", vec![]).unwrap()),
            Err(ScoringError::DuplicateRealTimeScorer(_))
        ));

        // Duration scorer is Unknown (no rule matches), count gives Above
        assert_eq!(
            table.authored_real_time_assessment(),
            Some(AssessmentLevel::AboveExpectation)
        );

        table.start_event(2, &[]).unwrap();
        assert_eq!(
            table.authored_real_time_assessment(),
            Some(AssessmentLevel::AtExpectation)
        );

        clock.set(6_000);
        assert_eq!(
            table.authored_real_time_assessment(),
            Some(AssessmentLevel::BelowExpectation)
        );
    }

    #[test]
    fn finalize_completion_sets_every_completion_scorer() {
        let (mut table, _) = table();
        table
            .add_scorer(
                Scorer::completion_time("Time to clear", Units::HhMmSs, vec![]).unwrap(),
                TeamMemberRef::Aggregate,
            )
            .unwrap();
        table.bind_team_members(&["alpha".to_string()]);

        table.finalize_completion(1_000, 91_000);
        for member in [TeamMemberRef::Aggregate, alpha()] {
            let scorer = table.scorer(ScorerKind::CompletionTime, &member).unwrap();
            assert_eq!(scorer.raw_score(0), "00:01:30");
        }
    }

    fn team_session() -> Vec<SessionMember> {
        vec![
            SessionMember::new("alice", Some("alpha")),
            SessionMember::new("bob", Some("bravo")),
            SessionMember::new("", Some("charlie")),
        ]
    }

    #[test]
    fn collect_scores_routes_member_and_aggregate_audiences() {
        let (mut table, clock) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();
        table.bind_team_members(&["alpha".to_string(), "bravo".to_string()]);

        table.start_event(1, &[alpha()]).unwrap();
        clock.set(2_000);

        let records = table.collect_scores(
            &team_session(),
            &["alpha".to_string(), "bravo".to_string()],
            None,
        );
        assert_eq!(records.len(), 3);

        let aggregate = records
            .iter()
            .find(|r| r.audience.len() == 2)
            .expect("aggregate record");
        assert_eq!(aggregate.raw_value, "2000");

        let alice = records
            .iter()
            .find(|r| r.audience == BTreeSet::from(["alice".to_string()]))
            .expect("alpha record");
        assert_eq!(alice.raw_value, "2000");

        let bob = records
            .iter()
            .find(|r| r.audience == BTreeSet::from(["bob".to_string()]))
            .expect("bravo record");
        assert_eq!(bob.raw_value, "0");

        // Closed out: later reads don't grow
        let scorer = table.scorer(ScorerKind::ViolationTime, &alpha()).unwrap();
        assert!(!scorer.has_started());
    }

    #[test]
    fn collect_scores_skips_aggregate_for_single_player() {
        let (mut table, _) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();
        table.bind_team_members(&["alpha".to_string()]);

        let records = table.collect_scores(&team_session(), &["alpha".to_string()], None);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].audience,
            BTreeSet::from(["alice".to_string()])
        );
    }

    #[test]
    fn collect_scores_skips_unplayed_member_roles() {
        let (mut table, _) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();
        table.bind_team_members(&["alpha".to_string(), "charlie".to_string()]);

        let records = table.collect_scores(
            &team_session(),
            &["alpha".to_string(), "charlie".to_string()],
            None,
        );
        // charlie has a blank username; alice is the only player, so the
        // aggregate is skipped too
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].audience, BTreeSet::from(["alice".to_string()]));
    }

    #[test]
    fn collect_scores_without_usernames_produces_nothing() {
        let (mut table, _) = table();
        table
            .add_scorer(duration("Time in sector"), TeamMemberRef::Aggregate)
            .unwrap();

        let records = table.collect_scores(&[], &[], None);
        assert!(records.is_empty());
    }

    #[test]
    fn collect_scores_excludes_internal_scorers() {
        let (mut table, _) = table();
        table.bind_team_members(&[]);
        let records = table.collect_scores(&team_session(), &[], None);
        assert!(records.is_empty());
    }

    #[test]
    fn single_player_session_without_roles_matches_any_assessed_ref() {
        let (mut table, _) = table();
        table
            .add_scorer(Scorer::count("Flags", vec![]).unwrap(), TeamMemberRef::Aggregate)
            .unwrap();
        table
            .add_scorer(
                Scorer::count("Learner flags", vec![]).unwrap(),
                TeamMemberRef::member("learner"),
            )
            .unwrap();

        let solo = vec![SessionMember::new("dana", None)];
        let records = table.collect_scores(&solo, &["learner".to_string()], None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "Learner flags");
        assert_eq!(records[0].audience, BTreeSet::from(["dana".to_string()]));
    }

    #[test]
    fn learner_scorer_reaches_solo_player() {
        let (mut table, _) = table();
        table
            .add_scorer(Scorer::count("Learner flags", vec![]).unwrap(), TeamMemberRef::Learner)
            .unwrap();
        table.start_event(2, &[TeamMemberRef::Learner]).unwrap();

        let solo = vec![SessionMember::new("dana", None)];
        let records = table.collect_scores(&solo, &[], None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "Learner flags");
        assert_eq!(records[0].raw_value, "2");
        assert_eq!(records[0].audience, BTreeSet::from(["dana".to_string()]));
    }

    #[test]
    fn learner_scorer_without_assessed_roles_reaches_every_player() {
        let (mut table, _) = table();
        table
            .add_scorer(Scorer::count("Learner flags", vec![]).unwrap(), TeamMemberRef::Learner)
            .unwrap();

        let records = table.collect_scores(&team_session(), &[], None);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].audience,
            BTreeSet::from(["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn learner_scorer_skipped_when_team_has_several_players() {
        let (mut table, _) = table();
        table
            .add_scorer(Scorer::count("Learner flags", vec![]).unwrap(), TeamMemberRef::Learner)
            .unwrap();

        let records = table.collect_scores(
            &team_session(),
            &["alpha".to_string(), "bravo".to_string()],
            None,
        );
        assert!(records.is_empty());
    }

    #[test]
    fn override_replaces_scorer_assessments() {
        let (mut table, _) = table();
        table
            .add_scorer(
                Scorer::count(
                    "Flags",
                    vec![ScoreRule::new(Comparison::Equal, 0, AssessmentLevel::AboveExpectation)],
                )
                .unwrap(),
                TeamMemberRef::Aggregate,
            )
            .unwrap();

        let score_override =
            ScoreOverride::new(AssessmentLevel::BelowExpectation).with_evaluator("oc-1");
        let records = table.collect_scores(&team_session(), &[], Some(&score_override));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assessment, AssessmentLevel::BelowExpectation);
        assert_eq!(records[0].evaluator.as_deref(), Some("oc-1"));
        assert_eq!(
            records[0].audience,
            BTreeSet::from(["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn override_without_scorers_synthesizes_team_and_individual_records() {
        let (mut table, _) = table();
        let score_override =
            ScoreOverride::new(AssessmentLevel::AtExpectation).with_comment("steady");

        let records = table.collect_scores(&team_session(), &[], Some(&score_override));

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.label == OVERRIDE_LABEL));
        assert!(records.iter().all(|r| r.units == OVERRIDE_UNITS));
        assert!(records.iter().all(|r| r.raw_value == "1"));
        assert_eq!(records[0].audience.len(), 2);
        assert_eq!(records[1].audience, BTreeSet::from(["alice".to_string()]));
        assert_eq!(records[2].observer_comment.as_deref(), Some("steady"));
    }
}
