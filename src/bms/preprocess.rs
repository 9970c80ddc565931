//! The conditional preprocessor.
//!
//! BMS control flow is a stack machine: `#RANDOM`/`#SETRANDOM` push a new
//! active value, `#IF`/`#ELSEIF`/`#ELSE`/`#ENDIF` frames branch on it,
//! and `#SWITCH`/`#SETSWITCH`/`#CASE`/`#SKIP`/`#DEF`/`#ENDSW` frames give
//! C-like fallthrough until `#SKIP`. A line survives preprocessing iff
//! the frame stack is empty or every frame on it reports active.
//!
//! Directive lines themselves are never emitted; together with every line
//! inside a conditional block they are captured verbatim into the expand
//! script for diagnostics and later re-evaluation.

use crate::rng::Rng;

use super::LoadWarning;

/// One surviving source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    /// 1-based line number in the original source.
    pub number: usize,
    /// The trimmed line text.
    pub text: &'a str,
}

/// Result of preprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOutput<'a> {
    /// The kept lines, conditionals resolved.
    pub lines: Vec<SourceLine<'a>>,
    /// Verbatim text of every control line and conditional branch.
    pub script: String,
    /// Diagnostics for unbalanced or malformed directives.
    pub warnings: Vec<LoadWarning>,
}

#[derive(Debug)]
struct IfFrame {
    /// Number of branches seen so far.
    cond_idx: u32,
    /// How many branches have activated.
    active_cnt: u32,
    /// Which branch is currently active; 0 when none.
    active_idx: u32,
}

impl IfFrame {
    fn active(&self) -> bool {
        self.active_idx != 0 && self.active_idx == self.cond_idx
    }
}

#[derive(Debug)]
struct SwitchFrame {
    value: u64,
    /// -1 skipped, 0 idle, >= 1 active.
    stat: i32,
}

#[derive(Debug)]
enum Frame {
    If(IfFrame),
    Switch(SwitchFrame),
}

impl Frame {
    fn active(&self) -> bool {
        match self {
            Frame::If(f) => f.active(),
            Frame::Switch(f) => f.stat > 0,
        }
    }
}

fn split_directive(line: &str) -> (String, &str) {
    let body = line;
    let name_end = body
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_end].to_ascii_lowercase();
    let value = body[name_end..].trim();
    (name, value)
}

fn parse_value(value: &str) -> Option<u64> {
    value.split_ascii_whitespace().next()?.parse().ok()
}

/// Evaluates the control flow of `source`.
///
/// With `process_conditionals` off no conditional content survives at
/// all; only the expand script is collected, so the chart can be
/// re-evaluated from it later with a different seed.
pub fn preprocess<'a, R: Rng>(
    source: &'a str,
    rng: &mut R,
    process_conditionals: bool,
) -> PreprocessOutput<'a> {
    let mut lines = Vec::new();
    let mut script = String::new();
    let mut warnings = Vec::new();

    let mut active_stack: Vec<u64> = Vec::new();
    let mut active: u64 = 0;
    let mut frames: Vec<Frame> = Vec::new();

    for (number, raw) in source.lines().enumerate() {
        let number = number + 1;
        let line = raw.trim();
        if !line.starts_with('#') {
            continue;
        }
        let (name, value) = split_directive(line);
        let mut is_control = true;

        match name.as_str() {
            "#random" | "#setrandom" => {
                let bound = parse_value(value).unwrap_or(1).max(1);
                active_stack.push(active);
                active = if name == "#setrandom" {
                    bound
                } else {
                    rng.generate(1..=bound)
                };
            }
            "#endrandom" => {
                if let Some(prev) = active_stack.pop() {
                    active = prev;
                } else {
                    warnings.push(LoadWarning::StrayDirective {
                        line: number,
                        directive: name.clone(),
                    });
                }
            }
            "#if" => {
                let target = parse_value(value).unwrap_or(0);
                let mut frame = IfFrame {
                    cond_idx: 1,
                    active_cnt: 0,
                    active_idx: 0,
                };
                if target == active {
                    frame.active_idx = 1;
                    frame.active_cnt = 1;
                }
                frames.push(Frame::If(frame));
            }
            "#elseif" => match frames.last_mut() {
                Some(Frame::If(frame)) => {
                    frame.cond_idx += 1;
                    let target = parse_value(value).unwrap_or(0);
                    if frame.active_cnt == 0 && target == active {
                        frame.active_idx = frame.cond_idx;
                        frame.active_cnt += 1;
                    }
                }
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            "#else" => match frames.last_mut() {
                Some(Frame::If(frame)) => {
                    frame.cond_idx += 1;
                    if frame.active_cnt == 0 {
                        frame.active_idx = frame.cond_idx;
                        frame.active_cnt += 1;
                    }
                }
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            "#endif" | "#end" => match frames.last() {
                Some(Frame::If(_)) => {
                    frames.pop();
                }
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            "#switch" | "#setswitch" => {
                let bound = parse_value(value).unwrap_or(1).max(1);
                let value = if name == "#setswitch" {
                    bound
                } else {
                    rng.generate(1..=bound)
                };
                frames.push(Frame::Switch(SwitchFrame { value, stat: 0 }));
            }
            "#case" => match frames.last_mut() {
                Some(Frame::Switch(frame)) => {
                    let target = parse_value(value).unwrap_or(0);
                    if frame.stat >= 0 && target == frame.value {
                        frame.stat += 1;
                    }
                }
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            "#skip" => match frames.last_mut() {
                Some(Frame::Switch(frame)) => frame.stat = -1,
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            "#def" => match frames.last_mut() {
                Some(Frame::Switch(frame)) => {
                    if frame.stat == 0 {
                        frame.stat = 1;
                    }
                }
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            "#endsw" => match frames.last() {
                Some(Frame::Switch(_)) => {
                    frames.pop();
                }
                _ => warnings.push(LoadWarning::StrayDirective {
                    line: number,
                    directive: name.clone(),
                }),
            },
            _ => is_control = false,
        }

        if is_control || !frames.is_empty() {
            script.push_str(line);
            script.push('\n');
        }
        if is_control {
            continue;
        }
        let kept = frames.is_empty()
            || (process_conditionals && frames.iter().all(Frame::active));
        if kept {
            lines.push(SourceLine { number, text: line });
        }
    }

    for _ in active_stack {
        warnings.push(LoadWarning::StrayDirective {
            line: source.lines().count(),
            directive: "#random".into(),
        });
    }

    PreprocessOutput {
        lines,
        script,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::RngMock;

    fn kept(source: &str, rng_values: [u64; 1]) -> Vec<String> {
        let mut rng = RngMock(rng_values);
        preprocess(source, &mut rng, true)
            .lines
            .iter()
            .map(|l| l.text.to_owned())
            .collect()
    }

    #[test]
    fn random_selects_one_branch() {
        const SRC: &str = "
#RANDOM 2
#IF 1
#00111:AA00
#ELSE
#00111:00BB
#ENDIF
#ENDRANDOM
";
        assert_eq!(kept(SRC, [1]), vec!["#00111:AA00"]);
        assert_eq!(kept(SRC, [2]), vec!["#00111:00BB"]);
    }

    #[test]
    fn elseif_takes_first_match_only() {
        const SRC: &str = "
#SETRANDOM 3
#IF 1
#A
#ELSEIF 3
#B
#ELSEIF 3
#C
#ELSE
#D
#ENDIF
";
        assert_eq!(kept(SRC, [9]), vec!["#B"]);
    }

    #[test]
    fn switch_falls_through_until_skip() {
        const SRC: &str = "
#SETSWITCH 1
#CASE 1
#A
#CASE 2
#B
#SKIP
#CASE 3
#C
#DEF
#D
#ENDSW
";
        // Case 1 matches, falls through case 2 content, stops at #SKIP.
        assert_eq!(kept(SRC, [9]), vec!["#A", "#B"]);
    }

    #[test]
    fn switch_def_activates_when_nothing_matched() {
        const SRC: &str = "
#SETSWITCH 5
#CASE 1
#A
#DEF
#D
#ENDSW
";
        assert_eq!(kept(SRC, [9]), vec!["#D"]);
    }

    #[test]
    fn nested_random_blocks() {
        const SRC: &str = "
#RANDOM 2
#IF 1
#OUTER
#RANDOM 2
#IF 2
#INNER
#ENDIF
#ENDRANDOM
#AFTER
#ENDIF
#ENDRANDOM
";
        let mut rng = RngMock([1, 2]);
        let out = preprocess(SRC, &mut rng, true);
        let texts: Vec<&str> = out.lines.iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["#OUTER", "#INNER", "#AFTER"]);
        assert_eq!(out.warnings, vec![]);
    }

    #[test]
    fn preserve_mode_drops_branch_content() {
        const SRC: &str = "
#TITLE kept
#RANDOM 2
#IF 1
#00111:AA00
#ENDIF
#ENDRANDOM
";
        let mut rng = RngMock([1]);
        let out = preprocess(SRC, &mut rng, false);
        let texts: Vec<&str> = out.lines.iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["#TITLE kept"]);
        assert!(out.script.contains("#RANDOM 2"));
        assert!(out.script.contains("#00111:AA00"));
    }

    #[test]
    fn stray_endif_warns() {
        let mut rng = RngMock([1]);
        let out = preprocess("#ENDIF\n#TITLE x\n", &mut rng, true);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.warnings.len(), 1);
    }
}
