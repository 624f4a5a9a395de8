//! The HTML status view served at `/debug/geerpc`.

use crate::server::Server;
use std::fmt::Write;

pub(crate) fn render(server: &Server) -> String {
    let mut page = String::with_capacity(1024);
    page.push_str("<html><body><title>GeeRPC Services</title>\n");
    for svc in server.services_snapshot() {
        let _ = write!(
            page,
            "<hr>Service {}<hr>\n<table>\n<th align=center>Method</th><th align=center>Calls</th>\n",
            svc.name()
        );
        for m in svc.methods() {
            let _ = write!(
                page,
                "<tr><td align=left font=fixed>{}.{}</td><td align=center>{}</td></tr>\n",
                svc.name(),
                m.name(),
                m.num_calls()
            );
        }
        page.push_str("</table>\n");
    }
    page.push_str("</body></html>");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;

    #[test]
    fn test_render_lists_methods() {
        let server = Server::new();
        server
            .register(
                Service::new("Foo")
                    .method("Sum", |args: (i64, i64)| async move { Ok::<_, String>(args.0 + args.1) }),
            )
            .expect("register");
        let page = render(&server);
        assert!(page.contains("Service Foo"));
        assert!(page.contains("Foo.Sum"));
    }
}
