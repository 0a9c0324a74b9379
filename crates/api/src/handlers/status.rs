use actix_web::HttpResponse;

const STATUS_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>sweep relay</title>
<style>
body { font-family: monospace; background: #111; color: #ddd; margin: 1.5em; }
h2 { color: #9cf; }
table { border-collapse: collapse; width: 100%; margin-bottom: 2em; }
td, th { border-bottom: 1px solid #333; padding: 0.25em 0.5em; text-align: left; }
.info { color: #ddd; } .receive { color: #7f7; } .send { color: #7cf; }
.broadcast { color: #aaf; } .warning { color: #fc6; } .error { color: #f66; }
</style>
</head>
<body>
<h2>Send details</h2>
<table>
<thead><tr><th>time</th><th>stage</th><th>amount</th><th>winner</th><th>rpcs</th><th>rpc ms</th><th>local ms</th><th>total ms</th><th>signature / error</th></tr></thead>
<tbody id="sends"></tbody>
</table>
<h2>Logs</h2>
<table><tbody id="logs"></tbody></table>
<script>
function cell(value) {
  const td = document.createElement("td");
  td.textContent = value === null || value === undefined ? "-" : value;
  return td;
}
async function refresh() {
  try {
    const sends = await (await fetch("/api/send-details?limit=20")).json();
    const sendRows = sends.map((d) => {
      const tr = document.createElement("tr");
      [d.timestamp, d.stage, d.lamports_to_send, d.winner_rpc, d.total_rpcs, d.rpc_ms,
       d.local_processing_ms, d.total_duration_ms, d.signature || d.error]
        .forEach((v) => tr.appendChild(cell(v)));
      return tr;
    });
    document.getElementById("sends").replaceChildren(...sendRows);

    const logs = await (await fetch("/api/logs")).json();
    const logRows = logs.map((l) => {
      const tr = document.createElement("tr");
      tr.className = l.category;
      [l.timestamp, l.category, l.message].forEach((v) => tr.appendChild(cell(v)));
      return tr;
    });
    document.getElementById("logs").replaceChildren(...logRows);
  } catch (err) {
    console.error(err);
  }
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;

/// Read-only status page; all data comes from the JSON routes.
pub async fn status_page_handler() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(STATUS_PAGE)
}
