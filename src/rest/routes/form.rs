// rest/routes/form.rs — static HTML form for poking the daemon by hand.
// Not part of the API contract; everything it does goes through POST /rpc.

use axum::response::Html;

pub async fn form() -> Html<&'static str> {
    Html(FORM_HTML)
}

const FORM_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>lncd</title>
    <script>
        function submitForm(event) {
            event.preventDefault();
            const form = event.target;
            const response = document.getElementById('response');
            const data = {
                Connection: {
                    Mailbox: form.mailbox.value,
                    PairingPhrase: form.pairingPhrase.value,
                    LocalKey: form.localKey.value,
                    RemoteKey: form.remoteKey.value
                },
                Method: form.method.value,
                Payload: form.payload.value
            };
            fetch('/rpc', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(data)
            })
            .then(r => r.json())
            .then(data => { response.innerHTML = JSON.stringify(data, null, 2); })
            .catch(err => { response.innerHTML = err; });
        }
    </script>
    <style>
        input,textarea { width: 90vw; }
        textarea { height: 20vh; }
    </style>
</head>
<body>
    <h1>lncd Test Form</h1>
    <form onsubmit="submitForm(event)">
        <label for="mailbox">Mailbox:</label><br>
        <input value="mailbox.terminal.lightning.today:443" type="text" id="mailbox" name="mailbox"><br>
        <label for="pairingPhrase">Pairing Phrase:</label><br>
        <input type="text" id="pairingPhrase" name="pairingPhrase"><br>
        <label for="localKey">Local Key:</label><br>
        <input type="text" id="localKey" name="localKey"><br>
        <label for="remoteKey">Remote Key:</label><br>
        <input type="text" id="remoteKey" name="remoteKey"><br>
        <label for="method">Method:</label><br>
        <input value="lnrpc.Lightning.AddInvoice" type="text" id="method" name="method"><br>
        <label for="payload">Payload:</label><br>
        <textarea id="payload" name="payload">{"memo":"test","value":1000}</textarea><br>
        <input type="submit" value="Submit">
    </form>
    <pre id="response"></pre>
</body>
</html>
"#;
