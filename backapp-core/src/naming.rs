use crate::constants::naming;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// 渲染命名规则所需的上下文
#[derive(Debug, Clone)]
pub struct NamingContext<'a> {
    pub profile_name: &'a str,
    pub server_name: &'a str,
    pub now: DateTime<Utc>,
}

/// 替换值中的路径分隔符，使占位符不会引入新的目录层级
fn sanitize(value: &str) -> String {
    value.replace(['/', '\\'], "_")
}

fn render_component(component: &str, ctx: &NamingContext<'_>) -> String {
    component
        .replace(naming::PROFILE, &sanitize(ctx.profile_name))
        .replace(naming::SERVER_NAME, &sanitize(ctx.server_name))
        .replace(
            naming::TIMESTAMP,
            &ctx.now.format(naming::TIMESTAMP_FORMAT).to_string(),
        )
        .replace(naming::DATE, &ctx.now.format(naming::DATE_FORMAT).to_string())
        .replace(naming::TIME, &ctx.now.format(naming::TIME_FORMAT).to_string())
}

fn is_usable(component: &str) -> bool {
    !component.is_empty() && component != "." && component != ".."
}

/// 将命名规则渲染为存储位置下的相对目录
///
/// 模式中的 `/` 产生嵌套目录，`.`、`..` 和空段被丢弃；渲染结果为空时
/// 回退为配置名。
pub fn render_directory(pattern: &str, ctx: &NamingContext<'_>) -> PathBuf {
    let components: Vec<String> = pattern
        .split('/')
        .map(|part| render_component(part, ctx).trim().to_string())
        .filter(|part| is_usable(part))
        .collect();

    if components.is_empty() {
        let fallback = sanitize(ctx.profile_name.trim());
        return if is_usable(&fallback) {
            PathBuf::from(fallback)
        } else {
            PathBuf::from("backup")
        };
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx<'a>(profile: &'a str, server: &'a str) -> NamingContext<'a> {
        NamingContext {
            profile_name: profile,
            server_name: server,
            now: Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap(),
        }
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let path = render_directory("{profile}/{date}_{time}", &ctx("web", "srv"));
        assert_eq!(path, PathBuf::from("web").join("2024-03-09_07-05-02"));

        let path = render_directory("{SERVER_NAME}-{TIMESTAMP}", &ctx("web", "srv"));
        assert_eq!(path, PathBuf::from("srv-2024-03-09_07-05-02"));
    }

    #[test]
    fn test_values_cannot_escape_the_storage_root() {
        let path = render_directory("../{profile}/./x", &ctx("a/../b", "srv"));
        assert_eq!(path, PathBuf::from("a_.._b").join("x"));
    }

    #[test]
    fn test_empty_render_falls_back_to_profile_name() {
        assert_eq!(render_directory("", &ctx("nightly", "s")), PathBuf::from("nightly"));
        assert_eq!(render_directory("/..//", &ctx("", "s")), PathBuf::from("backup"));
    }
}
