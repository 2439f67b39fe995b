use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::debug;

use crate::error::SelectionError;
use crate::models::FileRule;
use crate::session::RemoteSession;

/// 规则路径的选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// 规则路径本身是文件
    Single,
    /// 目录，仅直接子文件
    Shallow,
    /// 目录，递归全部文件
    Recursive,
}

/// 选中的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub remote_path: String,
    /// 相对于本次运行目标目录的落盘路径
    pub relative_path: PathBuf,
}

/// 一条规则的选择结果
#[derive(Debug, Clone)]
pub struct Selection {
    pub mode: SelectionMode,
    pub root: String,
    pub files: Vec<SelectedFile>,
    /// 被排除模式过滤掉的路径
    pub excluded: Vec<String>,
}

/// 逗号分隔的排除模式
///
/// 基名匹配任一通配模式，或者完整路径包含该模式原文，都会被排除。
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    tokens: Vec<(String, Option<glob::Pattern>)>,
}

impl ExcludeMatcher {
    pub fn parse(pattern: &str) -> Self {
        let tokens = pattern
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| (token.to_string(), glob::Pattern::new(token).ok()))
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let base = base_name(path);
        self.tokens.iter().any(|(token, glob)| {
            glob.as_ref().is_some_and(|g| g.matches(base)) || path.contains(token.as_str())
        })
    }
}

pub(crate) fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => trimmed,
    }
}

/// root 下的相对路径分段
fn relative_components<'a>(root: &str, path: &'a str) -> Vec<&'a str> {
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root).unwrap_or(path);
    rest.split('/').filter(|c| !c.is_empty()).collect()
}

/// 与“目录优先、按名称排序”的深度优先遍历一致的顺序
///
/// 第一个不同的分段处，后面还有分段的一方是目录。
fn compare_walk_order(a: &[&str], b: &[&str]) -> Ordering {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        if x == y {
            continue;
        }
        let x_is_dir = i + 1 < a.len();
        let y_is_dir = i + 1 < b.len();
        return y_is_dir.cmp(&x_is_dir).then_with(|| x.cmp(y));
    }
    a.len().cmp(&b.len())
}

/// 解析一条规则要传输的文件
pub async fn resolve(
    rule: &FileRule,
    session: &dyn RemoteSession,
) -> Result<Selection, SelectionError> {
    let root = rule.remote_path.as_str();

    let exists = session
        .exists(root)
        .await
        .map_err(|source| SelectionError::Inspect {
            path: root.to_string(),
            source,
        })?;
    if !exists {
        return Err(SelectionError::PathNotFound {
            path: root.to_string(),
        });
    }

    let is_dir = session
        .is_dir(root)
        .await
        .map_err(|source| SelectionError::Inspect {
            path: root.to_string(),
            source,
        })?;

    if !is_dir {
        return Ok(Selection {
            mode: SelectionMode::Single,
            root: root.to_string(),
            files: vec![SelectedFile {
                remote_path: root.to_string(),
                relative_path: PathBuf::from(base_name(root)),
            }],
            excluded: Vec::new(),
        });
    }

    let mode = if rule.recursive {
        SelectionMode::Recursive
    } else {
        SelectionMode::Shallow
    };

    let listed = session
        .list_files(root, rule.recursive)
        .await
        .map_err(|source| SelectionError::Listing {
            path: root.to_string(),
            source,
        })?;

    let matcher = ExcludeMatcher::parse(&rule.exclude_pattern);
    let (mut kept, excluded): (Vec<String>, Vec<String>) =
        listed.into_iter().partition(|path| !matcher.is_excluded(path));

    kept.sort_by(|a, b| {
        compare_walk_order(&relative_components(root, a), &relative_components(root, b))
    });

    let files = kept
        .into_iter()
        .map(|remote_path| {
            let relative_path = match mode {
                SelectionMode::Recursive => {
                    let components = relative_components(root, &remote_path);
                    if components.is_empty() {
                        PathBuf::from(base_name(&remote_path))
                    } else {
                        components.iter().collect()
                    }
                }
                _ => PathBuf::from(base_name(&remote_path)),
            };
            SelectedFile {
                remote_path,
                relative_path,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "规则 {} 选中 {} 个文件，排除 {} 个",
        rule.id,
        files.len(),
        excluded.len()
    );

    Ok(Selection {
        mode,
        root: root.to_string(),
        files,
        excluded,
    })
}
